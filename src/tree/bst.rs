//! Unbalanced binary search tree
//!
//! The baseline ordered index: no balancing, so height is worst-case
//! O(n). Every operation here is iterative with an explicit stack; a
//! degenerate chain must be bounded by memory, not by the call stack.
//! That includes destruction, which would otherwise recurse through the
//! Box chain.

use crate::filter::{IndexError, IndexResult, RatingIndex};
use crate::persist::errors::{PersistError, PersistResult};
use crate::persist::snapshot::{FlatNode, TreeSnapshot};
use crate::record::{validate_rating, Record};

#[derive(Debug)]
struct BstNode {
    rating: f64,
    record: Record,
    left: Option<Box<BstNode>>,
    right: Option<Box<BstNode>>,
}

/// Unbalanced binary search tree keyed by rating.
///
/// Invariant: every left-subtree key <= node key <= every right-subtree
/// key; equal keys route left.
#[derive(Debug, Default)]
pub struct BinarySearchTree {
    root: Option<Box<BstNode>>,
    size: usize,
    frozen: bool,
}

impl BinarySearchTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys in in-order traversal order; non-decreasing by construction.
    pub fn keys_in_order(&self) -> Vec<f64> {
        self.inorder().into_iter().map(|(rating, _)| rating).collect()
    }

    /// In-order (rating, record) collection via an explicit stack.
    fn inorder(&self) -> Vec<(f64, Record)> {
        let mut results = Vec::with_capacity(self.size);
        let mut stack: Vec<&BstNode> = Vec::new();
        let mut current = self.root.as_deref();

        while current.is_some() || !stack.is_empty() {
            while let Some(node) = current {
                stack.push(node);
                current = node.left.as_deref();
            }
            if let Some(node) = stack.pop() {
                results.push((node.rating, node.record.clone()));
                current = node.right.as_deref();
            }
        }
        results
    }

    /// Flattens the tree for persistence. The walk is iterative; the
    /// iteration budget reports a corrupted in-memory graph instead of
    /// looping.
    pub fn to_snapshot(&self) -> PersistResult<TreeSnapshot> {
        let budget = self.size.saturating_mul(2) + 1;
        let mut steps = 0usize;
        let mut nodes: Vec<FlatNode> = Vec::with_capacity(self.size);
        // (node, parent slot) where the slot is (parent index, is_left)
        let mut stack: Vec<(&BstNode, Option<(usize, bool)>)> = Vec::new();
        if let Some(root) = self.root.as_deref() {
            stack.push((root, None));
        }

        while let Some((node, parent)) = stack.pop() {
            steps += 1;
            if steps > budget {
                return Err(PersistError::DepthExceeded { budget });
            }
            let idx = nodes.len();
            nodes.push(FlatNode {
                rating: node.rating,
                record: node.record.clone(),
                left: None,
                right: None,
            });
            if let Some((parent_idx, is_left)) = parent {
                if is_left {
                    nodes[parent_idx].left = Some(idx);
                } else {
                    nodes[parent_idx].right = Some(idx);
                }
            }
            if let Some(left) = node.left.as_deref() {
                stack.push((left, Some((idx, true))));
            }
            if let Some(right) = node.right.as_deref() {
                stack.push((right, Some((idx, false))));
            }
        }

        Ok(TreeSnapshot {
            root: if nodes.is_empty() { None } else { Some(0) },
            nodes,
        })
    }

    /// Rebuilds a tree from a validated snapshot, children before
    /// parents, with no recursion.
    pub fn from_snapshot(snapshot: TreeSnapshot) -> PersistResult<Self> {
        let order = snapshot.postorder()?;
        let size = snapshot.nodes.len();
        let root_idx = snapshot.root;
        let mut slots: Vec<Option<FlatNode>> = snapshot.nodes.into_iter().map(Some).collect();
        let mut built: Vec<Option<Box<BstNode>>> = (0..size).map(|_| None).collect();

        for idx in order {
            let flat = slots[idx]
                .take()
                .ok_or_else(|| PersistError::corrupt("node slot consumed twice"))?;
            let left = flat.left.and_then(|i| built[i].take());
            let right = flat.right.and_then(|i| built[i].take());
            built[idx] = Some(Box::new(BstNode {
                rating: flat.rating,
                record: flat.record,
                left,
                right,
            }));
        }

        let root = match root_idx {
            Some(idx) => {
                let node = built[idx]
                    .take()
                    .ok_or_else(|| PersistError::corrupt("root node missing after rebuild"))?;
                Some(node)
            }
            None => None,
        };

        Ok(Self {
            root,
            size,
            frozen: false,
        })
    }
}

impl RatingIndex for BinarySearchTree {
    fn structure_name(&self) -> &'static str {
        "bst"
    }

    fn insert(&mut self, rating: f64, record: Record) -> IndexResult<()> {
        if self.frozen {
            return Err(IndexError::Frozen { structure: "bst" });
        }
        let rating = validate_rating(rating)?;

        let mut link = &mut self.root;
        while let Some(node) = link {
            // Duplicates route left, consistently.
            link = if rating <= node.rating {
                &mut node.left
            } else {
                &mut node.right
            };
        }
        *link = Some(Box::new(BstNode {
            rating,
            record,
            left: None,
            right: None,
        }));
        self.size += 1;
        Ok(())
    }

    fn search(&self, rating: f64) -> Vec<Record> {
        if !rating.is_finite() {
            return Vec::new();
        }
        let mut results = Vec::new();
        let mut stack: Vec<&BstNode> = Vec::new();
        if let Some(root) = self.root.as_deref() {
            stack.push(root);
        }
        while let Some(node) = stack.pop() {
            if rating < node.rating {
                if let Some(left) = node.left.as_deref() {
                    stack.push(left);
                }
            } else if rating > node.rating {
                if let Some(right) = node.right.as_deref() {
                    stack.push(right);
                }
            } else {
                results.push(node.record.clone());
                // Equal keys may sit on either side of this node.
                if let Some(left) = node.left.as_deref() {
                    stack.push(left);
                }
                if let Some(right) = node.right.as_deref() {
                    stack.push(right);
                }
            }
        }
        results
    }

    fn get_range(&self, min: f64, max: f64) -> Vec<Record> {
        enum Walk<'a> {
            Visit(&'a BstNode),
            Emit(&'a BstNode),
        }

        let mut results = Vec::new();
        let mut stack: Vec<Walk<'_>> = Vec::new();
        if let Some(root) = self.root.as_deref() {
            stack.push(Walk::Visit(root));
        }
        while let Some(step) = stack.pop() {
            match step {
                Walk::Visit(node) => {
                    // Pushed right-emit-left so the pops run in order.
                    if max > node.rating {
                        if let Some(right) = node.right.as_deref() {
                            stack.push(Walk::Visit(right));
                        }
                    }
                    if min <= node.rating && node.rating <= max {
                        stack.push(Walk::Emit(node));
                    }
                    // Equal keys route left, so the min bound must descend
                    // left on equality too.
                    if min <= node.rating {
                        if let Some(left) = node.left.as_deref() {
                            stack.push(Walk::Visit(left));
                        }
                    }
                }
                Walk::Emit(node) => results.push(node.record.clone()),
            }
        }
        results
    }

    fn get_top_k(&self, k: usize) -> Vec<Record> {
        let mut all = self.inorder();
        all.sort_by(|a, b| b.0.total_cmp(&a.0));
        all.into_iter().take(k).map(|(_, record)| record).collect()
    }

    fn get_height(&self) -> usize {
        let mut height = 0usize;
        let mut stack: Vec<(&BstNode, usize)> = Vec::new();
        if let Some(root) = self.root.as_deref() {
            stack.push((root, 1));
        }
        while let Some((node, depth)) = stack.pop() {
            height = height.max(depth);
            if let Some(left) = node.left.as_deref() {
                stack.push((left, depth + 1));
            }
            if let Some(right) = node.right.as_deref() {
                stack.push((right, depth + 1));
            }
        }
        height
    }

    fn get_size(&self) -> usize {
        self.size
    }

    fn all_records(&self) -> Vec<Record> {
        self.inorder().into_iter().map(|(_, record)| record).collect()
    }

    fn freeze(&mut self) {
        self.frozen = true;
    }

    fn is_frozen(&self) -> bool {
        self.frozen
    }
}

impl Drop for BinarySearchTree {
    fn drop(&mut self) {
        // A degenerate chain would otherwise recurse through Box drops.
        let mut stack = Vec::new();
        if let Some(root) = self.root.take() {
            stack.push(root);
        }
        while let Some(mut node) = stack.pop() {
            if let Some(left) = node.left.take() {
                stack.push(left);
            }
            if let Some(right) = node.right.take() {
                stack.push(right);
            }
        }
    }
}
