//! Definition of the interface for nodes stored in an [super::ArenaTree]

/// Container that holds a payload (the *load*) in a tree
pub trait Nodelike<Load, NodeId> {
    fn is_leaf(&self) -> bool;
    fn get(&self) -> &Load;
    fn get_mut(&mut self) -> &mut Load;

    fn id(&self) -> NodeId;
    /// Get the node's distance to its root node.
    fn depth(&self) -> usize;
}
