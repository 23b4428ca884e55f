//! [Arena memory allocated](https://en.wikipedia.org/wiki/Region-based_memory_management)
//! forest for fast, directional traversal of articulated bodies.
//!
//! Nodes are addressed by [ArenaIndex] handles instead of references, and the arena is kept
//! sorted in depth-first order: parents always precede their children, and the subtree of a
//! node occupies the contiguous range `index .. index + width`. Root-to-leaf passes iterate
//! the arena forwards, leaf-to-root passes iterate it backwards.

pub mod depth;
pub mod directed;
pub mod iterables;
mod utils;

pub use depth::DepthFirstIterator;
pub use directed::{ArenaIndex, ArenaNode, ArenaTree};
pub use iterables::Nodelike;
