//! Digit trie over rating keys
//!
//! The rating is rendered with one decimal place and the point removed
//! (4.5 -> "45"), and that digit string is the trie path. Exact search
//! walks the full path; a prefix like "4" covers every rating in
//! [4.0, 4.9]. Children hang off a BTreeMap, so traversal order is
//! ascending by digit string.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::filter::{IndexError, IndexResult, RatingIndex};
use crate::persist::errors::{PersistError, PersistResult};
use crate::persist::snapshot::{FlatTrieNode, TrieSnapshot};
use crate::record::{approx_record_size, rating_digits, validate_rating, Record};

use super::SearchMetrics;

#[derive(Debug, Default)]
struct DigitTrieNode {
    children: BTreeMap<char, Box<DigitTrieNode>>,
    records: Vec<Record>,
    is_end: bool,
    // Exact rating for end nodes; the digit path alone is ambiguous
    // ("100" is both 10.0 and 1.00-rounded), the stored key is not.
    rating: Option<f64>,
}

/// Trie over the decimal-digit encoding of the rating.
#[derive(Debug)]
pub struct DigitTrie {
    root: DigitTrieNode,
    size: usize,
    node_count: usize,
    record_bytes: usize,
    comparisons: AtomicU64,
    frozen: bool,
}

impl Default for DigitTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl DigitTrie {
    /// Creates an empty digit trie.
    pub fn new() -> Self {
        Self {
            root: DigitTrieNode::default(),
            size: 0,
            node_count: 1,
            record_bytes: 0,
            comparisons: AtomicU64::new(0),
            frozen: false,
        }
    }

    /// Cumulative comparison count across all queries.
    pub fn total_comparisons(&self) -> u64 {
        self.comparisons.load(Ordering::Relaxed)
    }

    /// Approximate memory footprint, in bytes.
    pub fn memory_estimate(&self) -> usize {
        self.node_count * std::mem::size_of::<DigitTrieNode>() + self.record_bytes
    }

    /// All records whose digit string starts with `prefix`, truncated to
    /// `max_results`, plus this query's measurements.
    pub fn search_prefix(&self, prefix: &str, max_results: usize) -> (Vec<Record>, SearchMetrics) {
        let started = Instant::now();
        let mut comparisons = 0u64;
        let mut results = Vec::new();

        let mut node = Some(&self.root);
        for ch in prefix.chars() {
            comparisons += 1;
            node = node.and_then(|n| n.children.get(&ch).map(Box::as_ref));
            if node.is_none() {
                break;
            }
        }

        if let Some(start) = node {
            let mut stack = vec![start];
            while let Some(n) = stack.pop() {
                if results.len() >= max_results {
                    break;
                }
                if n.is_end {
                    for record in &n.records {
                        if results.len() >= max_results {
                            break;
                        }
                        results.push(record.clone());
                    }
                }
                // Reverse push keeps the pop order ascending by digit.
                for child in n.children.values().rev() {
                    comparisons += 1;
                    stack.push(child);
                }
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

    /// (rating, record) pairs in ascending digit-string order.
    fn entries(&self) -> Vec<(f64, Record)> {
        let mut results = Vec::with_capacity(self.size);
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            if node.is_end {
                if let Some(rating) = node.rating {
                    for record in &node.records {
                        results.push((rating, record.clone()));
                    }
                }
            }
            for child in node.children.values().rev() {
                stack.push(child);
            }
        }
        results
    }

    /// Dumps the trie into a flat node pool (root at index 0).
    pub fn to_snapshot(&self) -> PersistResult<TrieSnapshot> {
        let mut nodes = vec![FlatTrieNode {
            children: Vec::new(),
            records: self.root.records.clone(),
            is_end: self.root.is_end,
            rating: self.root.rating,
        }];

        let mut queue: VecDeque<(usize, &DigitTrieNode)> = VecDeque::new();
        queue.push_back((0, &self.root));
        let budget = self.node_count.saturating_mul(2) + 1;
        let mut steps = 0usize;

        while let Some((flat_idx, node)) = queue.pop_front() {
            steps += 1;
            if steps > budget {
                return Err(PersistError::DepthExceeded { budget });
            }
            for (&ch, child) in &node.children {
                let child_idx = nodes.len();
                nodes.push(FlatTrieNode {
                    children: Vec::new(),
                    records: child.records.clone(),
                    is_end: child.is_end,
                    rating: child.rating,
                });
                nodes[flat_idx].children.push((ch, child_idx));
                queue.push_back((child_idx, child));
            }
        }

        Ok(TrieSnapshot { nodes })
    }

    /// Rebuilds a trie from a validated flat node pool.
    pub fn from_snapshot(snapshot: TrieSnapshot) -> PersistResult<Self> {
        let order = snapshot.postorder()?;
        let mut slots: Vec<Option<DigitTrieNode>> = Vec::new();
        slots.resize_with(snapshot.nodes.len(), || None);

        let mut size = 0usize;
        let mut record_bytes = 0usize;

        for idx in order {
            let flat = &snapshot.nodes[idx];
            if flat.is_end && flat.rating.is_none() {
                return Err(PersistError::corrupt(format!(
                    "digit-trie end node {} has no rating",
                    idx
                )));
            }
            let mut children = BTreeMap::new();
            for &(ch, child_idx) in &flat.children {
                let child = slots[child_idx].take().ok_or_else(|| {
                    PersistError::corrupt(format!("digit-trie child {} resolved twice", child_idx))
                })?;
                children.insert(ch, Box::new(child));
            }
            size += flat.records.len();
            record_bytes += flat.records.iter().map(approx_record_size).sum::<usize>();
            slots[idx] = Some(DigitTrieNode {
                children,
                records: flat.records.clone(),
                is_end: flat.is_end,
                rating: flat.rating,
            });
        }

        let root = slots
            .first_mut()
            .and_then(Option::take)
            .ok_or_else(|| PersistError::corrupt("digit-trie snapshot has no root"))?;

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

impl RatingIndex for DigitTrie {
    fn structure_name(&self) -> &'static str {
        "digit_trie"
    }

    fn insert(&mut self, rating: f64, record: Record) -> IndexResult<()> {
        if self.frozen {
            return Err(IndexError::Frozen {
                structure: "digit_trie",
            });
        }
        let rating = validate_rating(rating)?;

        let mut node = &mut self.root;
        for ch in rating_digits(rating).chars() {
            let created = !node.children.contains_key(&ch);
            node = node.children.entry(ch).or_default();
            if created {
                self.node_count += 1;
            }
        }
        node.is_end = true;
        node.rating = Some(rating);
        self.record_bytes += approx_record_size(&record);
        node.records.push(record);
        self.size += 1;
        Ok(())
    }

    fn search(&self, rating: f64) -> Vec<Record> {
        if !rating.is_finite() {
            return Vec::new();
        }
        let mut node = Some(&self.root);
        for ch in rating_digits(rating).chars() {
            node = node.and_then(|n| n.children.get(&ch).map(Box::as_ref));
        }
        match node {
            Some(n) if n.is_end => n.records.clone(),
            _ => Vec::new(),
        }
    }

    fn get_range(&self, min: f64, max: f64) -> Vec<Record> {
        self.entries()
            .into_iter()
            .filter(|(rating, _)| min <= *rating && *rating <= max)
            .map(|(_, record)| record)
            .collect()
    }

    fn get_top_k(&self, k: usize) -> Vec<Record> {
        let mut all = self.entries();
        all.sort_by(|a, b| b.0.total_cmp(&a.0));
        all.into_iter().take(k).map(|(_, record)| record).collect()
    }

    fn get_height(&self) -> usize {
        let mut height = 0usize;
        let mut stack: Vec<(&DigitTrieNode, usize)> = vec![(&self.root, 0)];
        while let Some((node, depth)) = stack.pop() {
            height = height.max(depth);
            for child in node.children.values() {
                stack.push((child, depth + 1));
            }
        }
        height
    }

    fn get_size(&self) -> usize {
        self.size
    }

    fn all_records(&self) -> Vec<Record> {
        self.entries().into_iter().map(|(_, record)| record).collect()
    }

    fn freeze(&mut self) {
        self.frozen = true;
    }

    fn is_frozen(&self) -> bool {
        self.frozen
    }
}
