//! Character trie over normalized name keys

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::filter::{IndexError, IndexResult};
use crate::persist::errors::{PersistError, PersistResult};
use crate::persist::snapshot::{FlatTrieNode, TrieSnapshot};
use crate::record::{approx_record_size, normalize_name, Record};

use super::{PrefixIndex, SearchMetrics};

#[derive(Debug, Default)]
struct CharTrieNode {
    children: BTreeMap<char, Box<CharTrieNode>>,
    records: Vec<Record>,
    is_end: bool,
}

/// Trie over the characters of a normalized string key. Keys are
/// lowercased and trimmed on insertion, so prefix queries are
/// case-insensitive.
#[derive(Debug)]
pub struct CharTrie {
    root: CharTrieNode,
    size: usize,
    node_count: usize,
    record_bytes: usize,
    comparisons: AtomicU64,
    frozen: bool,
}

impl Default for CharTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl CharTrie {
    /// Creates an empty character trie.
    pub fn new() -> Self {
        Self {
            root: CharTrieNode::default(),
            size: 0,
            node_count: 1,
            record_bytes: 0,
            comparisons: AtomicU64::new(0),
            frozen: false,
        }
    }

    /// Dumps the trie into a flat node pool (root at index 0).
    pub fn to_snapshot(&self) -> PersistResult<TrieSnapshot> {
        let mut nodes = vec![FlatTrieNode {
            children: Vec::new(),
            records: self.root.records.clone(),
            is_end: self.root.is_end,
            rating: None,
        }];

        let mut queue: VecDeque<(usize, &CharTrieNode)> = VecDeque::new();
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
                    rating: None,
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
        let mut slots: Vec<Option<CharTrieNode>> = Vec::new();
        slots.resize_with(snapshot.nodes.len(), || None);

        let mut size = 0usize;
        let mut record_bytes = 0usize;

        for idx in order {
            let flat = &snapshot.nodes[idx];
            let mut children = BTreeMap::new();
            for &(ch, child_idx) in &flat.children {
                let child = slots[child_idx].take().ok_or_else(|| {
                    PersistError::corrupt(format!("trie child {} resolved twice", child_idx))
                })?;
                children.insert(ch, Box::new(child));
            }
            size += flat.records.len();
            record_bytes += flat.records.iter().map(approx_record_size).sum::<usize>();
            slots[idx] = Some(CharTrieNode {
                children,
                records: flat.records.clone(),
                is_end: flat.is_end,
            });
        }

        let root = slots
            .first_mut()
            .and_then(|slot| slot.take())
            .ok_or_else(|| PersistError::corrupt("trie snapshot has no root"))?;

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

impl PrefixIndex for CharTrie {
    fn structure_name(&self) -> &'static str {
        "char_trie"
    }

    fn insert(&mut self, key: &str, record: Record) -> IndexResult<()> {
        if self.frozen {
            return Err(IndexError::Frozen {
                structure: "char_trie",
            });
        }
        let normalized = normalize_name(key)?;

        let mut node = &mut self.root;
        for ch in normalized.chars() {
            let created = !node.children.contains_key(&ch);
            node = node.children.entry(ch).or_default();
            if created {
                self.node_count += 1;
            }
        }
        node.is_end = true;
        self.record_bytes += approx_record_size(&record);
        node.records.push(record);
        self.size += 1;
        Ok(())
    }

    fn search_prefix(&self, prefix: &str, max_results: usize) -> (Vec<Record>, SearchMetrics) {
        let started = Instant::now();
        let mut comparisons = 0u64;
        let mut results = Vec::new();

        let normalized = prefix.trim().to_lowercase();
        let mut node = Some(&self.root);
        for ch in normalized.chars() {
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
                // Reverse push keeps the pop order lexicographic.
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

    fn get_size(&self) -> usize {
        self.size
    }

    fn total_comparisons(&self) -> u64 {
        self.comparisons.load(Ordering::Relaxed)
    }

    fn memory_estimate(&self) -> usize {
        self.node_count * std::mem::size_of::<CharTrieNode>() + self.record_bytes
    }

    fn freeze(&mut self) {
        self.frozen = true;
    }

    fn is_frozen(&self) -> bool {
        self.frozen
    }
}
