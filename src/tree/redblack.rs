//! Red-Black tree
//!
//! Nodes live in an index-addressed arena: parent and child links are
//! indices into the pool, and index 0 is a single shared Black sentinel
//! standing in for every null leaf and the nil-parent of the root. That
//! keeps O(1) rotation bookkeeping without reference cycles or double
//! ownership, and the arena serializes directly for persistence.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::filter::{IndexError, IndexResult, RatingIndex};
use crate::persist::errors::{PersistError, PersistResult};
use crate::persist::snapshot::RbSnapshot;
use crate::record::{validate_rating, Record};

/// Index of the shared sentinel node.
pub const NIL: usize = 0;

/// Node color tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    /// Red node: both children must be Black
    Red,
    /// Black node: counted in black-heights
    Black,
}

/// One arena slot. The sentinel at index 0 is Black, carries a null
/// record, and links only to itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RbNode {
    /// Rating key (0.0 for the sentinel)
    pub rating: f64,
    /// Stored record (null for the sentinel)
    pub record: Record,
    /// Color tag
    pub color: Color,
    /// Parent index (NIL for the root and the sentinel)
    pub parent: usize,
    /// Left child index
    pub left: usize,
    /// Right child index
    pub right: usize,
}

impl RbNode {
    fn sentinel() -> Self {
        Self {
            rating: 0.0,
            record: Value::Null,
            color: Color::Black,
            parent: NIL,
            left: NIL,
            right: NIL,
        }
    }
}

/// Red-Black tree keyed by rating.
///
/// Invariants: the root and the sentinel are Black, no Red node has a
/// Red child, and every path from a node to a descendant sentinel
/// crosses the same number of Black nodes. Equal keys route left.
#[derive(Debug)]
pub struct RedBlackTree {
    nodes: Vec<RbNode>,
    root: usize,
    size: usize,
    frozen: bool,
}

impl Default for RedBlackTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RedBlackTree {
    /// Creates an empty tree holding only the sentinel.
    pub fn new() -> Self {
        Self {
            nodes: vec![RbNode::sentinel()],
            root: NIL,
            size: 0,
            frozen: false,
        }
    }

    /// Keys in in-order traversal order; non-decreasing by construction.
    pub fn keys_in_order(&self) -> Vec<f64> {
        self.inorder().into_iter().map(|(rating, _)| rating).collect()
    }

    /// Verifies the Red-Black invariants, returning the black-height of
    /// the root, or None if any invariant is violated.
    pub fn black_height(&self) -> Option<usize> {
        if self.root == NIL {
            return Some(0);
        }
        if self.nodes[self.root].color != Color::Black {
            return None;
        }

        // Iterative check: compute each node's black-height bottom-up.
        let order = {
            let mut order = Vec::with_capacity(self.size);
            let mut stack = vec![self.root];
            while let Some(idx) = stack.pop() {
                order.push(idx);
                let node = &self.nodes[idx];
                if node.left != NIL {
                    stack.push(node.left);
                }
                if node.right != NIL {
                    stack.push(node.right);
                }
            }
            order.reverse();
            order
        };

        let mut heights = vec![0usize; self.nodes.len()];
        for idx in order {
            let node = &self.nodes[idx];
            if node.color == Color::Red {
                let left_red =
                    node.left != NIL && self.nodes[node.left].color == Color::Red;
                let right_red =
                    node.right != NIL && self.nodes[node.right].color == Color::Red;
                if left_red || right_red {
                    return None;
                }
            }
            let left_height = if node.left == NIL { 1 } else { heights[node.left] };
            let right_height = if node.right == NIL { 1 } else { heights[node.right] };
            if left_height != right_height {
                return None;
            }
            heights[idx] = left_height + usize::from(node.color == Color::Black);
        }

        Some(heights[self.root])
    }

    fn fix_insert(&mut self, mut node: usize) {
        while self.nodes[self.nodes[node].parent].color == Color::Red {
            let parent = self.nodes[node].parent;
            let grandparent = self.nodes[parent].parent;

            if parent == self.nodes[grandparent].left {
                let uncle = self.nodes[grandparent].right;
                if self.nodes[uncle].color == Color::Red {
                    self.nodes[parent].color = Color::Black;
                    self.nodes[uncle].color = Color::Black;
                    self.nodes[grandparent].color = Color::Red;
                    node = grandparent;
                } else {
                    if node == self.nodes[parent].right {
                        // Straighten the zig-zag before the final rotate
                        node = parent;
                        self.rotate_left(node);
                    }
                    let parent = self.nodes[node].parent;
                    let grandparent = self.nodes[parent].parent;
                    self.nodes[parent].color = Color::Black;
                    self.nodes[grandparent].color = Color::Red;
                    self.rotate_right(grandparent);
                }
            } else {
                let uncle = self.nodes[grandparent].left;
                if self.nodes[uncle].color == Color::Red {
                    self.nodes[parent].color = Color::Black;
                    self.nodes[uncle].color = Color::Black;
                    self.nodes[grandparent].color = Color::Red;
                    node = grandparent;
                } else {
                    if node == self.nodes[parent].left {
                        node = parent;
                        self.rotate_right(node);
                    }
                    let parent = self.nodes[node].parent;
                    let grandparent = self.nodes[parent].parent;
                    self.nodes[parent].color = Color::Black;
                    self.nodes[grandparent].color = Color::Red;
                    self.rotate_left(grandparent);
                }
            }
        }

        let root = self.root;
        self.nodes[root].color = Color::Black;
    }

    fn rotate_left(&mut self, x: usize) {
        let y = self.nodes[x].right;
        let y_left = self.nodes[y].left;

        self.nodes[x].right = y_left;
        if y_left != NIL {
            self.nodes[y_left].parent = x;
        }

        let x_parent = self.nodes[x].parent;
        self.nodes[y].parent = x_parent;
        if x_parent == NIL {
            self.root = y;
        } else if x == self.nodes[x_parent].left {
            self.nodes[x_parent].left = y;
        } else {
            self.nodes[x_parent].right = y;
        }

        self.nodes[y].left = x;
        self.nodes[x].parent = y;
    }

    fn rotate_right(&mut self, y: usize) {
        let x = self.nodes[y].left;
        let x_right = self.nodes[x].right;

        self.nodes[y].left = x_right;
        if x_right != NIL {
            self.nodes[x_right].parent = y;
        }

        let y_parent = self.nodes[y].parent;
        self.nodes[x].parent = y_parent;
        if y_parent == NIL {
            self.root = x;
        } else if y == self.nodes[y_parent].right {
            self.nodes[y_parent].right = x;
        } else {
            self.nodes[y_parent].left = x;
        }

        self.nodes[x].right = y;
        self.nodes[y].parent = x;
    }

    /// In-order (rating, record) collection via an explicit stack.
    fn inorder(&self) -> Vec<(f64, Record)> {
        let mut results = Vec::with_capacity(self.size);
        let mut stack: Vec<usize> = Vec::new();
        let mut current = self.root;

        while current != NIL || !stack.is_empty() {
            while current != NIL {
                stack.push(current);
                current = self.nodes[current].left;
            }
            if let Some(idx) = stack.pop() {
                results.push((self.nodes[idx].rating, self.nodes[idx].record.clone()));
                current = self.nodes[idx].right;
            }
        }
        results
    }

    /// Dumps the arena for persistence; the sentinel rides along at
    /// index 0, so the snapshot restores bit-for-bit.
    pub fn to_snapshot(&self) -> PersistResult<RbSnapshot> {
        Ok(RbSnapshot {
            root: self.root,
            nodes: self.nodes.clone(),
        })
    }

    /// Adopts a validated arena snapshot.
    pub fn from_snapshot(snapshot: RbSnapshot) -> PersistResult<Self> {
        let RbSnapshot { root, nodes } = snapshot;
        let len = nodes.len();

        if len == 0 {
            return Err(PersistError::corrupt("red-black arena missing its sentinel"));
        }
        let sentinel = &nodes[NIL];
        if sentinel.color != Color::Black || sentinel.left != NIL || sentinel.right != NIL {
            return Err(PersistError::corrupt("red-black sentinel is malformed"));
        }
        if root >= len {
            return Err(PersistError::corrupt(format!(
                "red-black root {} out of range (len {})",
                root, len
            )));
        }
        if root == NIL && len != 1 {
            return Err(PersistError::corrupt(
                "red-black arena has nodes but no root",
            ));
        }
        if root != NIL && nodes[root].parent != NIL {
            return Err(PersistError::corrupt("red-black root has a parent"));
        }

        // Every non-sentinel node must be reachable from the root
        // exactly once, with consistent parent back-links.
        let mut visited = vec![false; len];
        visited[NIL] = true;
        let mut count = 0usize;
        let mut stack = Vec::new();
        if root != NIL {
            stack.push(root);
        }
        let budget = len.saturating_mul(2) + 1;
        let mut steps = 0usize;
        while let Some(idx) = stack.pop() {
            steps += 1;
            if steps > budget {
                return Err(PersistError::DepthExceeded { budget });
            }
            if idx >= len {
                return Err(PersistError::corrupt(format!(
                    "red-black child index {} out of range",
                    idx
                )));
            }
            if visited[idx] {
                return Err(PersistError::corrupt(format!(
                    "red-black node {} referenced more than once",
                    idx
                )));
            }
            visited[idx] = true;
            count += 1;
            let node = &nodes[idx];
            for child in [node.left, node.right] {
                if child != NIL {
                    if child >= len {
                        return Err(PersistError::corrupt(format!(
                            "red-black child index {} out of range",
                            child
                        )));
                    }
                    if nodes[child].parent != idx {
                        return Err(PersistError::corrupt(format!(
                            "red-black node {} has an inconsistent parent link",
                            child
                        )));
                    }
                    stack.push(child);
                }
            }
        }
        if count != len - 1 {
            return Err(PersistError::corrupt(format!(
                "{} unreachable nodes in red-black arena",
                (len - 1) - count
            )));
        }

        Ok(Self {
            nodes,
            root,
            size: len - 1,
            frozen: false,
        })
    }
}

impl RatingIndex for RedBlackTree {
    fn structure_name(&self) -> &'static str {
        "red_black"
    }

    fn insert(&mut self, rating: f64, record: Record) -> IndexResult<()> {
        if self.frozen {
            return Err(IndexError::Frozen {
                structure: "red_black",
            });
        }
        let rating = validate_rating(rating)?;

        let idx = self.nodes.len();
        self.nodes.push(RbNode {
            rating,
            record,
            color: Color::Red,
            parent: NIL,
            left: NIL,
            right: NIL,
        });

        let mut parent = NIL;
        let mut current = self.root;
        while current != NIL {
            parent = current;
            current = if rating <= self.nodes[current].rating {
                self.nodes[current].left
            } else {
                self.nodes[current].right
            };
        }

        self.nodes[idx].parent = parent;
        if parent == NIL {
            self.root = idx;
        } else if rating <= self.nodes[parent].rating {
            self.nodes[parent].left = idx;
        } else {
            self.nodes[parent].right = idx;
        }

        self.size += 1;
        self.fix_insert(idx);
        Ok(())
    }

    fn search(&self, rating: f64) -> Vec<Record> {
        if !rating.is_finite() {
            return Vec::new();
        }
        let mut results = Vec::new();
        let mut stack = Vec::new();
        if self.root != NIL {
            stack.push(self.root);
        }
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if rating < node.rating {
                if node.left != NIL {
                    stack.push(node.left);
                }
            } else if rating > node.rating {
                if node.right != NIL {
                    stack.push(node.right);
                }
            } else {
                results.push(node.record.clone());
                // Equal keys may sit on either side of this node.
                if node.left != NIL {
                    stack.push(node.left);
                }
                if node.right != NIL {
                    stack.push(node.right);
                }
            }
        }
        results
    }

    fn get_range(&self, min: f64, max: f64) -> Vec<Record> {
        enum Walk {
            Visit(usize),
            Emit(usize),
        }

        let mut results = Vec::new();
        let mut stack: Vec<Walk> = Vec::new();
        if self.root != NIL {
            stack.push(Walk::Visit(self.root));
        }
        while let Some(step) = stack.pop() {
            match step {
                Walk::Visit(idx) => {
                    let node = &self.nodes[idx];
                    if max > node.rating && node.right != NIL {
                        stack.push(Walk::Visit(node.right));
                    }
                    if min <= node.rating && node.rating <= max {
                        stack.push(Walk::Emit(idx));
                    }
                    // Equal keys route left, so the min bound must descend
                    // left on equality too.
                    if min <= node.rating && node.left != NIL {
                        stack.push(Walk::Visit(node.left));
                    }
                }
                Walk::Emit(idx) => results.push(self.nodes[idx].record.clone()),
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
        let mut stack: Vec<(usize, usize)> = Vec::new();
        if self.root != NIL {
            stack.push((self.root, 1));
        }
        while let Some((idx, depth)) = stack.pop() {
            height = height.max(depth);
            let node = &self.nodes[idx];
            if node.left != NIL {
                stack.push((node.left, depth + 1));
            }
            if node.right != NIL {
                stack.push((node.right, depth + 1));
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
