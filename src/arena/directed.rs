//! Implementation of a directionally iterable
//! [arena allocated](https://en.wikipedia.org/wiki/Region-based_memory_management)
//! forest. The arena is re-sorted in depth-first order after every topological change
//! so that sub-trees can be visited by slicing instead of following references.

use super::iterables::Nodelike;
use crate::DynamicsError;
use core::fmt;
use std::ops::{Index, IndexMut, Range};
use std::{collections::HashMap, hash::Hash};

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Clone)]
pub struct ArenaIndex(pub usize);

impl From<usize> for ArenaIndex {
    fn from(value: usize) -> Self {
        ArenaIndex(value)
    }
}

impl fmt::Display for ArenaIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node structure to be used in an arena allocated tree. Fields are used to speed up iteration
#[derive(Debug, Clone)]
pub struct ArenaNode<Load, NodeId> {
    /// The user-defined load that the node owns
    pub(super) load: Load,
    /// Index in the arena allocation
    pub(super) index: ArenaIndex,
    /// identifier for lookups
    pub(super) id: NodeId,
    /// references for children
    pub(super) children: Vec<ArenaIndex>,
    /// Size of the sub-tree rooted in this node (including the node itself)
    pub(super) width: usize,
    /// Depth in the tree
    pub(super) depth: usize,
    pub(super) parent_ref: Option<ArenaIndex>,
}

impl<Load, NodeId> ArenaNode<Load, NodeId> {
    fn new(load: Load, id: NodeId, index: ArenaIndex, parent_ref: Option<ArenaIndex>) -> Self {
        ArenaNode {
            load,
            index,
            id,
            children: vec![],
            width: 1,
            depth: 0,
            parent_ref,
        }
    }

    pub fn index(&self) -> ArenaIndex {
        self.index
    }

    pub fn parent(&self) -> Option<ArenaIndex> {
        self.parent_ref
    }

    pub fn children(&self) -> &[ArenaIndex] {
        &self.children
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Arena range covered by the sub-tree rooted in this node
    pub fn subtree(&self) -> Range<usize> {
        self.index.0..self.index.0 + self.width
    }
}

impl<Load, NodeId> Nodelike<Load, NodeId> for ArenaNode<Load, NodeId>
where
    NodeId: Clone,
{
    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn get(&self) -> &Load {
        &self.load
    }

    fn get_mut(&mut self) -> &mut Load {
        &mut self.load
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn id(&self) -> NodeId {
        self.id.clone()
    }
}

impl<Load, NodeId> fmt::Display for ArenaNode<Load, NodeId>
where
    Load: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Arena index {:?}, children: {:?}, payload: {} ",
            self.index, self.children, self.load
        )
    }
}

/// Forest of nodes stored in a single arena in depth-first order.
///
/// Insertion and re-parenting are comparatively slow as they re-sort the arena. Traversal is
/// a plain slice iteration: forwards visits every parent before its children, backwards every
/// child before its parent.
#[derive(Debug, Clone)]
pub struct ArenaTree<Load, NodeId> {
    /// Memory allocated area for nodes
    pub(super) nodes: Vec<ArenaNode<Load, NodeId>>,

    /// Indices of the nodes without a parent, in insertion order
    pub(super) roots: Vec<ArenaIndex>,

    /// Lookup arena indices
    pub(super) lookup: HashMap<NodeId, ArenaIndex>,
}

impl<Load, NodeId> Default for ArenaTree<Load, NodeId> {
    fn default() -> Self {
        ArenaTree {
            nodes: vec![],
            roots: vec![],
            lookup: HashMap::new(),
        }
    }
}

impl<Load, NodeId> ArenaTree<Load, NodeId>
where
    NodeId: Eq + Hash + Clone + fmt::Display,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ArenaTree {
            nodes: Vec::with_capacity(capacity),
            roots: vec![],
            lookup: HashMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[ArenaIndex] {
        &self.roots
    }

    pub fn nodes(&self) -> &[ArenaNode<Load, NodeId>] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut [ArenaNode<Load, NodeId>] {
        &mut self.nodes
    }

    pub fn node(&self, index: ArenaIndex) -> Result<&ArenaNode<Load, NodeId>, DynamicsError> {
        self.nodes
            .get(index.0)
            .ok_or(DynamicsError::ReferenceOutOfBound(index.0))
    }

    pub fn node_mut(&mut self, index: ArenaIndex) -> Result<&mut ArenaNode<Load, NodeId>, DynamicsError> {
        self.nodes
            .get_mut(index.0)
            .ok_or(DynamicsError::ReferenceOutOfBound(index.0))
    }

    pub fn node_by_id(&self, node_id: &NodeId) -> Option<&ArenaNode<Load, NodeId>> {
        self.lookup.get(node_id).map(|index| &self.nodes[index.0])
    }

    pub fn index_of(&self, node_id: &NodeId) -> Option<ArenaIndex> {
        self.lookup.get(node_id).copied()
    }

    /// Whether `node` is `root` or one of its descendants
    pub fn is_in_subtree(&self, root: ArenaIndex, node: ArenaIndex) -> bool {
        self.nodes
            .get(root.0)
            .is_some_and(|r| r.subtree().contains(&node.0))
    }

    /// Adds a new tree to the forest. Returns the arena index of the node.
    pub fn add_root(&mut self, load: Load, node_id: NodeId) -> Result<ArenaIndex, DynamicsError> {
        self.insert(load, node_id, None)
    }

    /// Adds a node below `parent`. Returns the arena index of the node after re-sorting.
    /// Indices of existing nodes remain valid when nodes are added in depth-first order.
    pub fn add(
        &mut self,
        load: Load,
        node_id: NodeId,
        parent: ArenaIndex,
    ) -> Result<ArenaIndex, DynamicsError> {
        if parent.0 >= self.nodes.len() {
            return Err(DynamicsError::ReferenceOutOfBound(parent.0));
        }
        self.insert(load, node_id, Some(parent))
    }

    fn insert(
        &mut self,
        load: Load,
        node_id: NodeId,
        parent: Option<ArenaIndex>,
    ) -> Result<ArenaIndex, DynamicsError> {
        if self.lookup.contains_key(&node_id) {
            return Err(DynamicsError::NotUnique(node_id.to_string()));
        }
        let index = ArenaIndex(self.nodes.len());
        self.nodes.push(ArenaNode::new(load, node_id, index, parent));
        match parent {
            Some(parent) => self.nodes[parent.0].children.push(index),
            None => self.roots.push(index),
        }
        let new_of_old = self.sort_depth_first();
        Ok(new_of_old[index.0])
    }

    /// Re-parents the sub-tree rooted in `node` below `new_parent` (or makes it a new tree
    /// of the forest). Returns the mapping from old to new arena indices.
    pub fn move_subtree(
        &mut self,
        node: ArenaIndex,
        new_parent: Option<ArenaIndex>,
    ) -> Result<Vec<ArenaIndex>, DynamicsError> {
        let moved = self.node(node)?;
        if let Some(parent) = new_parent {
            let parent_node = self.node(parent)?;
            if self.is_in_subtree(node, parent) {
                return Err(DynamicsError::Cycle {
                    node: moved.id.to_string(),
                    parent: parent_node.id.to_string(),
                });
            }
        }
        let old_parent = moved.parent_ref;
        match old_parent {
            Some(old) => self.nodes[old.0].children.retain(|child| *child != node),
            None => self.roots.retain(|root| *root != node),
        }
        self.nodes[node.0].parent_ref = new_parent;
        match new_parent {
            Some(parent) => self.nodes[parent.0].children.push(node),
            None => self.roots.push(node),
        }
        Ok(self.sort_depth_first())
    }
}

impl<Load, NodeId> Index<ArenaIndex> for ArenaTree<Load, NodeId> {
    type Output = ArenaNode<Load, NodeId>;

    fn index(&self, index: ArenaIndex) -> &Self::Output {
        &self.nodes[index.0]
    }
}

impl<Load, NodeId> IndexMut<ArenaIndex> for ArenaTree<Load, NodeId> {
    fn index_mut(&mut self, index: ArenaIndex) -> &mut Self::Output {
        &mut self.nodes[index.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    fn ids(tree: &ArenaTree<i32, String>) -> Vec<String> {
        tree.nodes().iter().map(|n| n.id()).collect_vec()
    }

    #[test_log::test]
    fn test_depth_first_order_after_insertion() {
        let mut tree = ArenaTree::<i32, String>::new();
        let a = tree.add_root(0, "a".into()).unwrap();
        let b = tree.add(1, "b".into(), a).unwrap();
        let _c = tree.add(2, "c".into(), a).unwrap();
        // d is a child of b and lands between b and c
        let d = tree.add(3, "d".into(), b).unwrap();

        assert_eq!(ids(&tree), vec!["a", "b", "d", "c"]);
        assert_eq!(d, ArenaIndex(2));
        assert_eq!(tree[ArenaIndex(0)].width(), 4);
        assert_eq!(tree[ArenaIndex(1)].width(), 2);
        assert_eq!(tree[ArenaIndex(2)].depth(), 2);
        assert_eq!(tree.index_of(&"c".to_string()), Some(ArenaIndex(3)));
        assert_eq!(*tree.node_by_id(&"d".to_string()).unwrap().get(), 3);
        assert!(tree.is_in_subtree(ArenaIndex(1), ArenaIndex(2)));
        assert!(!tree.is_in_subtree(ArenaIndex(1), ArenaIndex(3)));
    }

    #[test_log::test]
    fn test_not_unique() {
        let mut tree = ArenaTree::<i32, String>::new();
        let a = tree.add_root(0, "a".into()).unwrap();
        assert_eq!(
            tree.add(1, "a".into(), a),
            Err(DynamicsError::NotUnique("a".into()))
        );
        assert_eq!(
            tree.add(1, "b".into(), ArenaIndex(7)),
            Err(DynamicsError::ReferenceOutOfBound(7))
        );
    }

    #[test_log::test]
    fn test_move_subtree() {
        let mut tree = ArenaTree::<i32, String>::new();
        let a = tree.add_root(0, "a".into()).unwrap();
        let b = tree.add(1, "b".into(), a).unwrap();
        let c = tree.add(2, "c".into(), b).unwrap();
        let d = tree.add(3, "d".into(), a).unwrap();
        assert_eq!(ids(&tree), vec!["a", "b", "c", "d"]);

        // cycles are rejected without touching the tree
        assert!(matches!(tree.move_subtree(b, Some(c)), Err(DynamicsError::Cycle { .. })));
        assert_eq!(ids(&tree), vec!["a", "b", "c", "d"]);

        let new_of_old = tree.move_subtree(b, Some(d)).unwrap();
        assert_eq!(ids(&tree), vec!["a", "d", "b", "c"]);
        assert_eq!(new_of_old[b.0], ArenaIndex(2));
        assert_eq!(tree[ArenaIndex(1)].width(), 3);
        assert_eq!(tree[ArenaIndex(3)].depth(), 3);

        // detach into a separate tree
        tree.move_subtree(ArenaIndex(2), None).unwrap();
        assert_eq!(ids(&tree), vec!["a", "d", "b", "c"]);
        assert_eq!(tree.roots().len(), 2);
        assert_eq!(tree[ArenaIndex(2)].parent(), None);
        assert_eq!(tree[ArenaIndex(0)].width(), 2);
    }
}
