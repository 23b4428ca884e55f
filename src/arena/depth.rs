//! Depth-first traversal following child references, and the re-sorting of the arena
//! into depth-first order

use super::{utils::sort_by_indices, ArenaIndex, ArenaNode, ArenaTree};
use itertools::Itertools;
use std::{fmt, hash::Hash};

/// Depth-first iterator over a forest that follows child references. Slower than iterating the
/// sorted arena, but it remains correct while the arena is being re-arranged.
pub struct DepthFirstIterator<'a, Load, NodeId> {
    tree: &'a ArenaTree<Load, NodeId>,
    stack: Vec<std::slice::Iter<'a, ArenaIndex>>,
}

impl<'a, Load, NodeId> DepthFirstIterator<'a, Load, NodeId> {
    pub fn new(tree: &'a ArenaTree<Load, NodeId>, roots: &'a [ArenaIndex]) -> Self {
        DepthFirstIterator {
            tree,
            stack: vec![roots.iter()],
        }
    }
}

impl<'a, Load, NodeId> Iterator for DepthFirstIterator<'a, Load, NodeId> {
    type Item = &'a ArenaNode<Load, NodeId>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let siblings = self.stack.last_mut()?;
            match siblings.next() {
                Some(index) => {
                    let node = &self.tree.nodes[index.0];
                    self.stack.push(node.children.iter());
                    return Some(node);
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

impl<Load, NodeId> ArenaTree<Load, NodeId>
where
    NodeId: Eq + Hash + Clone + fmt::Display,
{
    /// Sorts the arena such that depth-first descent is a forward iteration and updates all
    /// references, widths and depths. Returns the new index of each node by old index.
    pub(super) fn sort_depth_first(&mut self) -> Vec<ArenaIndex> {
        let optimal_order = DepthFirstIterator::new(self, &self.roots)
            .map(|node| node.index)
            .collect_vec();
        debug_assert_eq!(optimal_order.len(), self.nodes.len());

        let mut new_of_old = vec![ArenaIndex(0); optimal_order.len()];
        optimal_order
            .iter()
            .enumerate()
            .for_each(|(new, old)| new_of_old[old.0] = ArenaIndex(new));
        sort_by_indices(&mut self.nodes, optimal_order);

        self.nodes.iter_mut().for_each(|node| {
            node.index = new_of_old[node.index.0];
            node.parent_ref = node.parent_ref.map(|p| new_of_old[p.0]);
            node.children
                .iter_mut()
                .for_each(|child| *child = new_of_old[child.0]);
        });
        self.roots
            .iter_mut()
            .for_each(|root| *root = new_of_old[root.0]);

        // parents precede children
        for i in 0..self.nodes.len() {
            let depth = self.nodes[i]
                .parent_ref
                .map_or(0, |p| self.nodes[p.0].depth + 1);
            self.nodes[i].depth = depth;
        }
        for i in (0..self.nodes.len()).rev() {
            let width = 1 + self.nodes[i]
                .children
                .iter()
                .map(|c| self.nodes[c.0].width)
                .sum::<usize>();
            self.nodes[i].width = width;
        }

        self.lookup.clear();
        for node in self.nodes.iter() {
            self.lookup.insert(node.id.clone(), node.index);
        }
        new_of_old
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Nodelike;

    #[test_log::test]
    fn test_iterates_forest() {
        let mut tree = ArenaTree::<u8, String>::new();
        let a = tree.add_root(0, "a".into()).unwrap();
        tree.add(1, "b".into(), a).unwrap();
        let x = tree.add_root(10, "x".into()).unwrap();
        tree.add(11, "y".into(), x).unwrap();

        let visited = DepthFirstIterator::new(&tree, tree.roots())
            .map(|n| *n.get())
            .collect_vec();
        assert_eq!(visited, vec![0, 1, 10, 11]);
        let arena = tree.nodes().iter().map(|n| *n.get()).collect_vec();
        assert_eq!(arena, visited);
        assert_eq!(tree[ArenaIndex(2)].subtree(), 2..4);
    }
}
