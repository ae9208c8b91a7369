//! Ordered rating indexes
//!
//! Three binary trees keyed by a floating-point rating: an unbalanced
//! BST, an AVL tree and a Red-Black tree. All share the same contract:
//! duplicate keys route left, search descends both subtrees on an
//! equality hit, ranges are inclusive, and top-K is a full in-order
//! collection followed by a descending sort.

pub mod avl;
pub mod bst;
pub mod redblack;

pub use avl::AvlTree;
pub use bst::BinarySearchTree;
pub use redblack::{Color, RedBlackTree};
