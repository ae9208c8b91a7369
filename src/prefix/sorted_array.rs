//! Sorted-array name index
//!
//! One contiguous sequence of (normalized key, display key, record)
//! entries kept in ascending normalized-key order. Insertion finds its
//! position by binary search and shifts the tail; prefix search binary
//! searches to the first candidate and scans forward until the first
//! non-match, which is sound because the sequence is sorted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::filter::{IndexError, IndexResult};
use crate::persist::errors::{PersistError, PersistResult};
use crate::persist::snapshot::{SortedArraySnapshot, SortedEntrySnapshot};
use crate::record::{approx_record_size, normalize_name, Record};

use super::{PrefixIndex, SearchMetrics};

#[derive(Debug, Clone)]
struct SortedEntry {
    normalized: String,
    display: String,
    record: Record,
}

/// Binary-searched array of name-keyed entries.
#[derive(Debug, Default)]
pub struct SortedArrayIndex {
    entries: Vec<SortedEntry>,
    record_bytes: usize,
    comparisons: AtomicU64,
    frozen: bool,
}

impl SortedArrayIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Display keys in stored (ascending normalized) order.
    pub fn keys_in_order(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.display.clone()).collect()
    }

    /// First index whose key is >= `prefix`, counting each probe.
    fn lower_bound(&self, prefix: &str, comparisons: &mut u64) -> usize {
        let mut lo = 0usize;
        let mut hi = self.entries.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            *comparisons += 1;
            if self.entries[mid].normalized.as_str() < prefix {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Dumps the entry sequence.
    pub fn to_snapshot(&self) -> PersistResult<SortedArraySnapshot> {
        Ok(SortedArraySnapshot {
            entries: self
                .entries
                .iter()
                .map(|e| SortedEntrySnapshot {
                    normalized: e.normalized.clone(),
                    display: e.display.clone(),
                    record: e.record.clone(),
                })
                .collect(),
        })
    }

    /// Rebuilds the index, verifying the ordering invariant instead of
    /// trusting the file.
    pub fn from_snapshot(snapshot: SortedArraySnapshot) -> PersistResult<Self> {
        let mut record_bytes = 0usize;
        for (i, entry) in snapshot.entries.iter().enumerate() {
            if entry.normalized.is_empty() {
                return Err(PersistError::corrupt(format!(
                    "sorted-array entry {} has an empty key",
                    i
                )));
            }
            if i > 0 && snapshot.entries[i - 1].normalized > entry.normalized {
                return Err(PersistError::corrupt(format!(
                    "sorted-array entries out of order at index {}",
                    i
                )));
            }
            record_bytes += approx_record_size(&entry.record)
                + entry.normalized.len()
                + entry.display.len();
        }

        Ok(Self {
            entries: snapshot
                .entries
                .into_iter()
                .map(|e| SortedEntry {
                    normalized: e.normalized,
                    display: e.display,
                    record: e.record,
                })
                .collect(),
            record_bytes,
            comparisons: AtomicU64::new(0),
            frozen: false,
        })
    }
}

impl PrefixIndex for SortedArrayIndex {
    fn structure_name(&self) -> &'static str {
        "sorted_array"
    }

    fn insert(&mut self, key: &str, record: Record) -> IndexResult<()> {
        if self.frozen {
            return Err(IndexError::Frozen {
                structure: "sorted_array",
            });
        }
        let normalized = normalize_name(key)?;

        // Upper bound keeps duplicate keys in insertion order.
        let pos = self
            .entries
            .partition_point(|e| e.normalized.as_str() <= normalized.as_str());
        self.record_bytes +=
            approx_record_size(&record) + normalized.len() + key.len();
        self.entries.insert(
            pos,
            SortedEntry {
                normalized,
                display: key.to_string(),
                record,
            },
        );
        Ok(())
    }

    fn search_prefix(&self, prefix: &str, max_results: usize) -> (Vec<Record>, SearchMetrics) {
        let started = Instant::now();
        let mut comparisons = 0u64;
        let mut results = Vec::new();

        let normalized = prefix.trim().to_lowercase();
        let start = self.lower_bound(&normalized, &mut comparisons);
        for entry in &self.entries[start..] {
            if results.len() >= max_results {
                break;
            }
            comparisons += 1;
            if !entry.normalized.starts_with(&normalized) {
                // Sorted order: no later entry can match either.
                break;
            }
            results.push(entry.record.clone());
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
        self.entries.len()
    }

    fn total_comparisons(&self) -> u64 {
        self.comparisons.load(Ordering::Relaxed)
    }

    fn memory_estimate(&self) -> usize {
        self.entries.len() * std::mem::size_of::<SortedEntry>() + self.record_bytes
    }

    fn freeze(&mut self) {
        self.frozen = true;
    }

    fn is_frozen(&self) -> bool {
        self.frozen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(name: &str) -> Record {
        json!({"name": name})
    }

    fn build(names: &[&str]) -> SortedArrayIndex {
        let mut index = SortedArrayIndex::new();
        for &name in names {
            index.insert(name, record(name)).unwrap();
        }
        index
    }

    #[test]
    fn test_entries_stay_sorted() {
        let index = build(&["united", "alaska", "delta", "qatar airways"]);
        let keys = index.keys_in_order();
        assert_eq!(keys, vec!["alaska", "delta", "qatar airways", "united"]);
    }

    #[test]
    fn test_prefix_scan_stops_at_first_non_match() {
        let index = build(&["dell", "delta", "delta air", "denver", "united"]);
        let (results, _) = index.search_prefix("del", 10);
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_prefix_case_insensitive() {
        let index = build(&["Delta Air Lines", "DELTAONE"]);
        let (results, _) = index.search_prefix("delta", 10);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_no_match_is_empty() {
        let index = build(&["delta"]);
        let (results, metrics) = index.search_prefix("zz", 10);
        assert!(results.is_empty());
        assert_eq!(metrics.result_count, 0);
    }

    #[test]
    fn test_max_results_truncation() {
        let index = build(&["aa", "ab", "ac", "ad"]);
        let (results, _) = index.search_prefix("a", 3);
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_duplicate_keys_keep_insertion_order() {
        let mut index = SortedArrayIndex::new();
        index.insert("delta", json!({"seq": 1})).unwrap();
        index.insert("delta", json!({"seq": 2})).unwrap();
        let (results, _) = index.search_prefix("delta", 10);
        assert_eq!(results[0]["seq"], json!(1));
        assert_eq!(results[1]["seq"], json!(2));
    }

    #[test]
    fn test_comparisons_logarithmic_for_lookup() {
        let names: Vec<String> = (0..1024).map(|i| format!("key{:04}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let index = build(&refs);
        let (_, metrics) = index.search_prefix("key0512", 1);
        // ~log2(1024) probes plus the forward scan
        assert!(metrics.comparisons <= 16, "comparisons = {}", metrics.comparisons);
    }

    #[test]
    fn test_frozen_rejects_insert() {
        let mut index = build(&["delta"]);
        index.freeze();
        assert!(matches!(
            index.insert("united", record("united")),
            Err(IndexError::Frozen { .. })
        ));
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let index = build(&["united", "alaska", "delta"]);
        let snapshot = index.to_snapshot().unwrap();
        let rebuilt = SortedArrayIndex::from_snapshot(snapshot).unwrap();
        assert_eq!(rebuilt.get_size(), 3);
        assert_eq!(rebuilt.keys_in_order(), index.keys_in_order());
    }

    #[test]
    fn test_from_snapshot_rejects_unsorted_entries() {
        let snapshot = SortedArraySnapshot {
            entries: vec![
                SortedEntrySnapshot {
                    normalized: "zeta".to_string(),
                    display: "Zeta".to_string(),
                    record: json!({}),
                },
                SortedEntrySnapshot {
                    normalized: "alpha".to_string(),
                    display: "Alpha".to_string(),
                    record: json!({}),
                },
            ],
        };
        assert!(matches!(
            SortedArrayIndex::from_snapshot(snapshot),
            Err(PersistError::Corrupt { .. })
        ));
    }
}
