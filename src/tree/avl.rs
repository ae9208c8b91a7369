//! AVL tree
//!
//! Self-balancing variant of the BST: after each insertion, heights are
//! recomputed bottom-up and one of the four rotation cases (LL, RR, LR,
//! RL) restores the balance-factor bound. Insertion recursion is safe
//! here: an AVL tree's height is O(log n) by construction. Read paths
//! stay iterative like the BST's.

use crate::filter::{IndexError, IndexResult, RatingIndex};
use crate::persist::errors::{PersistError, PersistResult};
use crate::persist::snapshot::{FlatNode, TreeSnapshot};
use crate::record::{validate_rating, Record};

#[derive(Debug)]
struct AvlNode {
    rating: f64,
    record: Record,
    height: usize,
    left: Option<Box<AvlNode>>,
    right: Option<Box<AvlNode>>,
}

impl AvlNode {
    fn leaf(rating: f64, record: Record) -> Self {
        Self {
            rating,
            record,
            height: 1,
            left: None,
            right: None,
        }
    }

    fn update_height(&mut self) {
        self.height = 1 + height_of(&self.left).max(height_of(&self.right));
    }

    fn balance_factor(&self) -> i64 {
        height_of(&self.left) as i64 - height_of(&self.right) as i64
    }
}

fn height_of(node: &Option<Box<AvlNode>>) -> usize {
    node.as_ref().map_or(0, |n| n.height)
}

/// AVL tree keyed by rating.
///
/// Invariant: |height(left) - height(right)| <= 1 at every node, in
/// addition to the BST ordering invariant (equal keys route left).
#[derive(Debug, Default)]
pub struct AvlTree {
    root: Option<Box<AvlNode>>,
    size: usize,
    frozen: bool,
}

impl AvlTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys in in-order traversal order; non-decreasing by construction.
    pub fn keys_in_order(&self) -> Vec<f64> {
        self.inorder().into_iter().map(|(rating, _)| rating).collect()
    }

    /// Whether every node satisfies the balance-factor bound.
    pub fn is_balanced(&self) -> bool {
        let mut stack: Vec<&AvlNode> = Vec::new();
        if let Some(root) = self.root.as_deref() {
            stack.push(root);
        }
        while let Some(node) = stack.pop() {
            if node.balance_factor().abs() > 1 {
                return false;
            }
            if let Some(left) = node.left.as_deref() {
                stack.push(left);
            }
            if let Some(right) = node.right.as_deref() {
                stack.push(right);
            }
        }
        true
    }

    fn insert_node(node: Option<Box<AvlNode>>, rating: f64, record: Record) -> Box<AvlNode> {
        let Some(mut node) = node else {
            return Box::new(AvlNode::leaf(rating, record));
        };

        if rating <= node.rating {
            node.left = Some(Self::insert_node(node.left.take(), rating, record));
        } else {
            node.right = Some(Self::insert_node(node.right.take(), rating, record));
        }
        node.update_height();

        let balance = node.balance_factor();

        if balance > 1 {
            let left_rating = node.left.as_ref().map_or(rating, |n| n.rating);
            if rating <= left_rating {
                // Left-Left
                return rotate_right(node);
            }
            // Left-Right
            node.left = node.left.take().map(rotate_left);
            return rotate_right(node);
        }

        if balance < -1 {
            let right_rating = node.right.as_ref().map_or(rating, |n| n.rating);
            if rating > right_rating {
                // Right-Right
                return rotate_left(node);
            }
            // Right-Left
            node.right = node.right.take().map(rotate_right);
            return rotate_left(node);
        }

        node
    }

    /// In-order (rating, record) collection via an explicit stack.
    fn inorder(&self) -> Vec<(f64, Record)> {
        let mut results = Vec::with_capacity(self.size);
        let mut stack: Vec<&AvlNode> = Vec::new();
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

    /// Flattens the tree for persistence.
    pub fn to_snapshot(&self) -> PersistResult<TreeSnapshot> {
        let budget = self.size.saturating_mul(2) + 1;
        let mut steps = 0usize;
        let mut nodes: Vec<FlatNode> = Vec::with_capacity(self.size);
        let mut stack: Vec<(&AvlNode, Option<(usize, bool)>)> = Vec::new();
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

    /// Rebuilds a tree from a validated snapshot. Cached heights are
    /// recomputed during assembly rather than trusted from storage.
    pub fn from_snapshot(snapshot: TreeSnapshot) -> PersistResult<Self> {
        let order = snapshot.postorder()?;
        let size = snapshot.nodes.len();
        let root_idx = snapshot.root;
        let mut slots: Vec<Option<FlatNode>> = snapshot.nodes.into_iter().map(Some).collect();
        let mut built: Vec<Option<Box<AvlNode>>> = (0..size).map(|_| None).collect();

        for idx in order {
            let flat = slots[idx]
                .take()
                .ok_or_else(|| PersistError::corrupt("node slot consumed twice"))?;
            let left = flat.left.and_then(|i| built[i].take());
            let right = flat.right.and_then(|i| built[i].take());
            let mut node = Box::new(AvlNode {
                rating: flat.rating,
                record: flat.record,
                height: 1,
                left,
                right,
            });
            node.update_height();
            built[idx] = Some(node);
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

fn rotate_right(mut y: Box<AvlNode>) -> Box<AvlNode> {
    debug_assert!(y.left.is_some(), "right rotation requires a left child");
    match y.left.take() {
        Some(mut x) => {
            y.left = x.right.take();
            y.update_height();
            x.right = Some(y);
            x.update_height();
            x
        }
        None => y,
    }
}

fn rotate_left(mut x: Box<AvlNode>) -> Box<AvlNode> {
    debug_assert!(x.right.is_some(), "left rotation requires a right child");
    match x.right.take() {
        Some(mut y) => {
            x.right = y.left.take();
            x.update_height();
            y.left = Some(x);
            y.update_height();
            y
        }
        None => x,
    }
}

impl RatingIndex for AvlTree {
    fn structure_name(&self) -> &'static str {
        "avl"
    }

    fn insert(&mut self, rating: f64, record: Record) -> IndexResult<()> {
        if self.frozen {
            return Err(IndexError::Frozen { structure: "avl" });
        }
        let rating = validate_rating(rating)?;
        let root = self.root.take();
        self.root = Some(Self::insert_node(root, rating, record));
        self.size += 1;
        Ok(())
    }

    fn search(&self, rating: f64) -> Vec<Record> {
        if !rating.is_finite() {
            return Vec::new();
        }
        let mut results = Vec::new();
        let mut stack: Vec<&AvlNode> = Vec::new();
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
            Visit(&'a AvlNode),
            Emit(&'a AvlNode),
        }

        let mut results = Vec::new();
        let mut stack: Vec<Walk<'_>> = Vec::new();
        if let Some(root) = self.root.as_deref() {
            stack.push(Walk::Visit(root));
        }
        while let Some(step) = stack.pop() {
            match step {
                Walk::Visit(node) => {
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
        height_of(&self.root)
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
