//! Ternary search tree over normalized name keys
//!
//! Each node holds one character and three children: less-than,
//! equal-continue, greater-than. Prefix search walks to the node where
//! the prefix is fully consumed, then descends only into the
//! equal-continue child; inside that subtree all three branches are
//! explored, because there they represent divergent continuations of
//! the same prefix rather than divergent prefixes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::filter::{IndexError, IndexResult};
use crate::persist::errors::{PersistError, PersistResult};
use crate::persist::snapshot::{FlatTstNode, TstSnapshot};
use crate::record::{approx_record_size, normalize_name, Record};

use super::{PrefixIndex, SearchMetrics};

#[derive(Debug)]
struct TstNode {
    ch: char,
    records: Vec<Record>,
    is_end: bool,
    left: Option<Box<TstNode>>,
    middle: Option<Box<TstNode>>,
    right: Option<Box<TstNode>>,
}

impl TstNode {
    fn new(ch: char) -> Self {
        Self {
            ch,
            records: Vec::new(),
            is_end: false,
            left: None,
            middle: None,
            right: None,
        }
    }
}

/// Ternary search tree keyed by a normalized string.
#[derive(Debug, Default)]
pub struct TernarySearchTree {
    root: Option<Box<TstNode>>,
    size: usize,
    node_count: usize,
    record_bytes: usize,
    comparisons: AtomicU64,
    frozen: bool,
}

impl TernarySearchTree {
    /// Creates an empty ternary search tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// In-order collection of a subtree, exploring all three branches.
    /// Appends to `results` until `max_results` is reached.
    fn collect(start: Option<&TstNode>, results: &mut Vec<Record>, max_results: usize) {
        enum Walk<'a> {
            Visit(&'a TstNode),
            Emit(&'a TstNode),
        }

        let mut stack: Vec<Walk> = Vec::new();
        if let Some(node) = start {
            stack.push(Walk::Visit(node));
        }
        while let Some(step) = stack.pop() {
            if results.len() >= max_results {
                return;
            }
            match step {
                Walk::Visit(node) => {
                    // Pop order left, self, middle, right keeps the
                    // results lexicographic.
                    if let Some(right) = node.right.as_deref() {
                        stack.push(Walk::Visit(right));
                    }
                    if let Some(middle) = node.middle.as_deref() {
                        stack.push(Walk::Visit(middle));
                    }
                    stack.push(Walk::Emit(node));
                    if let Some(left) = node.left.as_deref() {
                        stack.push(Walk::Visit(left));
                    }
                }
                Walk::Emit(node) => {
                    if node.is_end {
                        for record in &node.records {
                            if results.len() >= max_results {
                                return;
                            }
                            results.push(record.clone());
                        }
                    }
                }
            }
        }
    }

    /// Dumps the tree into a flat node pool.
    pub fn to_snapshot(&self) -> PersistResult<TstSnapshot> {
        let mut nodes: Vec<FlatTstNode> = Vec::new();
        let mut queue: VecDeque<(usize, &TstNode)> = VecDeque::new();

        let root = match self.root.as_deref() {
            Some(root) => {
                nodes.push(flatten_one(root));
                queue.push_back((0, root));
                Some(0)
            }
            None => None,
        };

        let budget = self.node_count.saturating_mul(2) + 1;
        let mut steps = 0usize;
        while let Some((flat_idx, node)) = queue.pop_front() {
            steps += 1;
            if steps > budget {
                return Err(PersistError::DepthExceeded { budget });
            }
            if let Some(child) = node.left.as_deref() {
                let idx = nodes.len();
                nodes.push(flatten_one(child));
                nodes[flat_idx].left = Some(idx);
                queue.push_back((idx, child));
            }
            if let Some(child) = node.middle.as_deref() {
                let idx = nodes.len();
                nodes.push(flatten_one(child));
                nodes[flat_idx].middle = Some(idx);
                queue.push_back((idx, child));
            }
            if let Some(child) = node.right.as_deref() {
                let idx = nodes.len();
                nodes.push(flatten_one(child));
                nodes[flat_idx].right = Some(idx);
                queue.push_back((idx, child));
            }
        }

        Ok(TstSnapshot { root, nodes })
    }

    /// Rebuilds a tree from a validated flat node pool.
    pub fn from_snapshot(snapshot: TstSnapshot) -> PersistResult<Self> {
        let order = snapshot.postorder()?;
        let mut slots: Vec<Option<Box<TstNode>>> = Vec::new();
        slots.resize_with(snapshot.nodes.len(), || None);

        let mut size = 0usize;
        let mut record_bytes = 0usize;

        let take_child = |slots: &mut Vec<Option<Box<TstNode>>>,
                              child: Option<usize>|
         -> PersistResult<Option<Box<TstNode>>> {
            match child {
                Some(idx) => slots[idx]
                    .take()
                    .map(Some)
                    .ok_or_else(|| {
                        PersistError::corrupt(format!("tst child {} resolved twice", idx))
                    }),
                None => Ok(None),
            }
        };

        for idx in order {
            let flat = &snapshot.nodes[idx];
            let left = take_child(&mut slots, flat.left)?;
            let middle = take_child(&mut slots, flat.middle)?;
            let right = take_child(&mut slots, flat.right)?;
            size += flat.records.len();
            record_bytes += flat.records.iter().map(approx_record_size).sum::<usize>();
            slots[idx] = Some(Box::new(TstNode {
                ch: flat.ch,
                records: flat.records.clone(),
                is_end: flat.is_end,
                left,
                middle,
                right,
            }));
        }

        let root = match snapshot.root {
            Some(root_idx) => Some(slots[root_idx].take().ok_or_else(|| {
                PersistError::corrupt("tst snapshot root resolved twice")
            })?),
            None => None,
        };

        Ok(Self {
            root,
            size,
            node_count: snapshot.nodes.len(),
            record_bytes,
            comparisons: AtomicU64::new(0),
            frozen: false,
        })
    }
}

fn flatten_one(node: &TstNode) -> FlatTstNode {
    FlatTstNode {
        ch: node.ch,
        records: node.records.clone(),
        is_end: node.is_end,
        left: None,
        middle: None,
        right: None,
    }
}

impl PrefixIndex for TernarySearchTree {
    fn structure_name(&self) -> &'static str {
        "tst"
    }

    fn insert(&mut self, key: &str, record: Record) -> IndexResult<()> {
        if self.frozen {
            return Err(IndexError::Frozen { structure: "tst" });
        }
        let normalized = normalize_name(key)?;
        let chars: Vec<char> = normalized.chars().collect();

        let mut link = &mut self.root;
        let mut pos = 0;
        loop {
            if link.is_none() {
                self.node_count += 1;
            }
            let node = link.get_or_insert_with(|| Box::new(TstNode::new(chars[pos])));
            let c = chars[pos];
            if c < node.ch {
                link = &mut node.left;
            } else if c > node.ch {
                link = &mut node.right;
            } else if pos + 1 < chars.len() {
                pos += 1;
                link = &mut node.middle;
            } else {
                node.is_end = true;
                self.record_bytes += approx_record_size(&record);
                node.records.push(record);
                self.size += 1;
                return Ok(());
            }
        }
    }

    fn search_prefix(&self, prefix: &str, max_results: usize) -> (Vec<Record>, SearchMetrics) {
        let started = Instant::now();
        let mut comparisons = 0u64;
        let mut results = Vec::new();

        let normalized = prefix.trim().to_lowercase();
        let chars: Vec<char> = normalized.chars().collect();

        if chars.is_empty() {
            // An empty prefix matches every key.
            Self::collect(self.root.as_deref(), &mut results, max_results);
        } else {
            let mut node = self.root.as_deref();
            let mut pos = 0;
            let mut terminal = None;
            while let Some(n) = node {
                comparisons += 1;
                let c = chars[pos];
                if c < n.ch {
                    node = n.left.as_deref();
                } else if c > n.ch {
                    node = n.right.as_deref();
                } else if pos + 1 == chars.len() {
                    terminal = Some(n);
                    break;
                } else {
                    pos += 1;
                    node = n.middle.as_deref();
                }
            }

            if let Some(n) = terminal {
                if n.is_end {
                    for record in &n.records {
                        if results.len() >= max_results {
                            break;
                        }
                        results.push(record.clone());
                    }
                }
                // Continuations live under the equal child only.
                Self::collect(n.middle.as_deref(), &mut results, max_results);
            }
        }

        self.comparisons.fetch_add(comparisons, Ordering::Relaxed);
        let metrics = SearchMetrics {
            comparisons,
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
            memory_bytes: self.memory_estimate(),
            result_count: results.len(),
        };
        (results, metrics)
    }

    fn get_size(&self) -> usize {
        self.size
    }

    fn total_comparisons(&self) -> u64 {
        self.comparisons.load(Ordering::Relaxed)
    }

    fn memory_estimate(&self) -> usize {
        self.node_count * std::mem::size_of::<TstNode>() + self.record_bytes
    }

    fn freeze(&mut self) {
        self.frozen = true;
    }

    fn is_frozen(&self) -> bool {
        self.frozen
    }
}

// Left/right chains grow with the number of distinct keys, so the
// default recursive drop could overflow the stack on large datasets.
impl Drop for TernarySearchTree {
    fn drop(&mut self) {
        let mut stack = Vec::new();
        if let Some(root) = self.root.take() {
            stack.push(root);
        }
        while let Some(mut node) = stack.pop() {
            for child in [node.left.take(), node.middle.take(), node.right.take()]
                .into_iter()
                .flatten()
            {
                stack.push(child);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(name: &str) -> Record {
        json!({"name": name})
    }

    fn build(names: &[&str]) -> TernarySearchTree {
        let mut tst = TernarySearchTree::new();
        for &name in names {
            tst.insert(name, record(name)).unwrap();
        }
        tst
    }

    #[test]
    fn test_prefix_collects_terminal_and_continuations() {
        let tst = build(&["delta", "delta air", "deltaone"]);
        let (results, _) = tst.search_prefix("delta", 10);
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_overlong_prefix_matches_nothing() {
        let tst = build(&["delta", "delta air", "deltaone"]);
        let (results, _) = tst.search_prefix("deltax", 10);
        assert!(results.is_empty());
    }

    #[test]
    fn test_sibling_keys_not_leaked_into_prefix() {
        let tst = build(&["delta", "denver", "dell"]);
        let (results, _) = tst.search_prefix("del", 10);
        let names: Vec<&str> =
            results.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"delta"));
        assert!(names.contains(&"dell"));
    }

    #[test]
    fn test_results_lexicographic() {
        let tst = build(&["qatar airways", "qantas", "qazaq air"]);
        let (results, _) = tst.search_prefix("qa", 10);
        let names: Vec<&str> =
            results.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["qantas", "qatar airways", "qazaq air"]);
    }

    #[test]
    fn test_empty_prefix_matches_all() {
        let tst = build(&["delta", "united", "alaska"]);
        let (results, _) = tst.search_prefix("", 10);
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_max_results_truncation() {
        let tst = build(&["aa", "ab", "ac", "ad"]);
        let (results, metrics) = tst.search_prefix("a", 2);
        assert_eq!(results.len(), 2);
        assert_eq!(metrics.result_count, 2);
    }

    #[test]
    fn test_duplicate_keys_accumulate() {
        let tst = build(&["delta", "delta"]);
        let (results, _) = tst.search_prefix("delta", 10);
        assert_eq!(results.len(), 2);
        assert_eq!(tst.get_size(), 2);
    }

    #[test]
    fn test_case_insensitive() {
        let tst = build(&["Delta Air Lines"]);
        let (results, _) = tst.search_prefix("DELTA", 10);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_frozen_rejects_insert() {
        let mut tst = build(&["delta"]);
        tst.freeze();
        assert!(matches!(
            tst.insert("united", record("united")),
            Err(IndexError::Frozen { .. })
        ));
    }

    #[test]
    fn test_many_keys_drop_without_overflow() {
        let mut tst = TernarySearchTree::new();
        for i in 0..20_000 {
            let key = format!("carrier-{:05}", i);
            tst.insert(&key, record(&key)).unwrap();
        }
        assert_eq!(tst.get_size(), 20_000);
        drop(tst);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let tst = build(&["delta", "delta air", "deltaone", "united", "alaska"]);
        let snapshot = tst.to_snapshot().unwrap();
        let rebuilt = TernarySearchTree::from_snapshot(snapshot).unwrap();

        assert_eq!(rebuilt.get_size(), 5);
        assert_eq!(rebuilt.search_prefix("delta", 10).0.len(), 3);
        assert_eq!(rebuilt.search_prefix("a", 10).0.len(), 1);
    }

    #[test]
    fn test_empty_tree_snapshot_roundtrip() {
        let tst = TernarySearchTree::new();
        let snapshot = tst.to_snapshot().unwrap();
        let rebuilt = TernarySearchTree::from_snapshot(snapshot).unwrap();
        assert_eq!(rebuilt.get_size(), 0);
        assert!(rebuilt.search_prefix("x", 10).0.is_empty());
    }
}
