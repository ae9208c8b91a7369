//! Flat, index-addressed snapshots of every structure
//!
//! Box-linked trees are flattened into node arrays with explicit-stack
//! walks, so serialization depth never depends on tree height. Every
//! snapshot validates its node graph on rebuild: child indices must be in
//! range and each node reachable exactly once.

use serde::{Deserialize, Serialize};

use crate::record::Record;
use crate::tree::redblack::RbNode;

use super::errors::{PersistError, PersistResult};

/// One node of a flattened binary tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatNode {
    /// Rating key
    pub rating: f64,
    /// The record stored at this node
    pub record: Record,
    /// Index of the left child, if any
    pub left: Option<usize>,
    /// Index of the right child, if any
    pub right: Option<usize>,
}

/// Flattened BST/AVL tree. AVL heights are recomputed on rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    /// Index of the root node, None for an empty tree
    pub root: Option<usize>,
    /// Node pool; indices in `root`/`left`/`right` address this array
    pub nodes: Vec<FlatNode>,
}

impl TreeSnapshot {
    /// Validates the node graph and returns indices in post-order, so a
    /// rebuild can construct children before parents.
    pub(crate) fn postorder(&self) -> PersistResult<Vec<usize>> {
        validated_postorder(self.nodes.len(), self.root, |idx| {
            let node = &self.nodes[idx];
            [node.left, node.right].into_iter().flatten().collect()
        })
    }
}

/// Flattened Red-Black arena. The arena is already index-addressed, so it
/// serializes directly; index 0 is the shared Black sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RbSnapshot {
    /// Index of the root node (0, the sentinel, for an empty tree)
    pub root: usize,
    /// The node arena, sentinel included
    pub nodes: Vec<RbNode>,
}

/// One node of a flattened digit or character trie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatTrieNode {
    /// Child edges: (edge character, node index)
    pub children: Vec<(char, usize)>,
    /// Records terminating exactly at this node's path
    pub records: Vec<Record>,
    /// End-of-key marker
    pub is_end: bool,
    /// Exact rating for digit-trie end nodes; None for character tries
    pub rating: Option<f64>,
}

/// Flattened trie; the root is always node 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrieSnapshot {
    /// Node pool; node 0 is the root
    pub nodes: Vec<FlatTrieNode>,
}

impl TrieSnapshot {
    /// Validates the node graph and returns indices in post-order.
    pub(crate) fn postorder(&self) -> PersistResult<Vec<usize>> {
        if self.nodes.is_empty() {
            return Err(PersistError::corrupt("trie snapshot has no root node"));
        }
        validated_postorder(self.nodes.len(), Some(0), |idx| {
            self.nodes[idx].children.iter().map(|(_, c)| *c).collect()
        })
    }
}

/// One node of a flattened ternary search tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatTstNode {
    /// Character stored at this node
    pub ch: char,
    /// Records terminating exactly at this node's path
    pub records: Vec<Record>,
    /// End-of-key marker
    pub is_end: bool,
    /// Less-than child
    pub left: Option<usize>,
    /// Equal/continue child (next string position)
    pub middle: Option<usize>,
    /// Greater-than child
    pub right: Option<usize>,
}

/// Flattened ternary search tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TstSnapshot {
    /// Index of the root node, None for an empty tree
    pub root: Option<usize>,
    /// Node pool
    pub nodes: Vec<FlatTstNode>,
}

impl TstSnapshot {
    /// Validates the node graph and returns indices in post-order.
    pub(crate) fn postorder(&self) -> PersistResult<Vec<usize>> {
        validated_postorder(self.nodes.len(), self.root, |idx| {
            let node = &self.nodes[idx];
            [node.left, node.middle, node.right]
                .into_iter()
                .flatten()
                .collect()
        })
    }
}

/// One entry of the sorted-array index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortedEntrySnapshot {
    /// Normalized (lowercased, trimmed) key the array is ordered by
    pub normalized: String,
    /// Original key as presented at insertion, for display
    pub display: String,
    /// The stored record
    pub record: Record,
}

/// Snapshot of the sorted-array index. Rebuild verifies the ordering
/// invariant instead of trusting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortedArraySnapshot {
    /// Entries in ascending normalized-key order
    pub entries: Vec<SortedEntrySnapshot>,
}

/// Snapshot of the bucket hash map: the exact capacity and load factor
/// are restored so the rebuilt table is bit-for-bit equivalent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashMapSnapshot {
    /// Bucket count at save time
    pub capacity: usize,
    /// Configured load-factor threshold
    pub load_factor: f64,
    /// (rating, records) pairs in bucket-scan order
    pub entries: Vec<(f64, Vec<Record>)>,
}

/// A serializable snapshot of any index structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "structure", rename_all = "snake_case")]
pub enum IndexSnapshot {
    /// Unbalanced binary search tree
    Bst(TreeSnapshot),
    /// AVL tree
    Avl(TreeSnapshot),
    /// Red-Black tree
    RedBlack(RbSnapshot),
    /// Digit trie over rating keys
    DigitTrie(TrieSnapshot),
    /// Character trie over name keys
    CharTrie(TrieSnapshot),
    /// Ternary search tree over name keys
    Tst(TstSnapshot),
    /// Sorted-array name index
    SortedArray(SortedArraySnapshot),
    /// Bucket hash map over rating keys
    HashMap(HashMapSnapshot),
}

/// Walks a node graph iteratively, validating that every child index is
/// in range and that each node is reached exactly once, then returns the
/// indices in post-order.
///
/// The iteration budget (2n + 1) turns a cyclic graph that slips past
/// the visited check into a reported condition rather than a hang.
fn validated_postorder<F>(len: usize, root: Option<usize>, children_of: F) -> PersistResult<Vec<usize>>
where
    F: Fn(usize) -> Vec<usize>,
{
    let Some(root) = root else {
        if len != 0 {
            return Err(PersistError::corrupt("nodes present but no root"));
        }
        return Ok(Vec::new());
    };

    let budget = len.saturating_mul(2) + 1;
    let mut steps = 0usize;
    let mut visited = vec![false; len];
    let mut order = Vec::with_capacity(len);
    let mut stack = vec![root];

    while let Some(idx) = stack.pop() {
        steps += 1;
        if steps > budget {
            return Err(PersistError::DepthExceeded { budget });
        }
        if idx >= len {
            return Err(PersistError::corrupt(format!(
                "node index {} out of range (len {})",
                idx, len
            )));
        }
        if visited[idx] {
            return Err(PersistError::corrupt(format!(
                "node {} referenced more than once",
                idx
            )));
        }
        visited[idx] = true;
        order.push(idx);
        // Children pushed in natural order, so the pop sequence is
        // node-then-reversed-children; reversing the whole walk below
        // yields a proper post-order.
        for child in children_of(idx) {
            stack.push(child);
        }
    }

    if order.len() != len {
        return Err(PersistError::corrupt(format!(
            "{} unreachable nodes in snapshot",
            len - order.len()
        )));
    }

    order.reverse();
    Ok(order)
}

impl IndexSnapshot {
    /// The structure-type tag carried by this snapshot.
    pub fn structure_name(&self) -> &'static str {
        match self {
            IndexSnapshot::Bst(_) => "bst",
            IndexSnapshot::Avl(_) => "avl",
            IndexSnapshot::RedBlack(_) => "red_black",
            IndexSnapshot::DigitTrie(_) => "digit_trie",
            IndexSnapshot::CharTrie(_) => "char_trie",
            IndexSnapshot::Tst(_) => "tst",
            IndexSnapshot::SortedArray(_) => "sorted_array",
            IndexSnapshot::HashMap(_) => "hash_map",
        }
    }
}
