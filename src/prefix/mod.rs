//! Prefix indexes over string keys
//!
//! Three interchangeable name indexes (character trie, ternary search
//! tree, sorted array) behind one contract, plus a digit trie over the
//! rating's decimal rendering. Every prefix search reports a metrics
//! record alongside its results so the structures can be compared on
//! equal terms.

use serde::{Deserialize, Serialize};

use crate::filter::IndexResult;
use crate::record::Record;

pub mod char_trie;
pub mod digit_trie;
pub mod sorted_array;
pub mod tst;

pub use char_trie::CharTrie;
pub use digit_trie::DigitTrie;
pub use sorted_array::SortedArrayIndex;
pub use tst::TernarySearchTree;

/// Per-query measurements reported by every prefix search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchMetrics {
    /// Key comparisons performed during this query
    pub comparisons: u64,
    /// Wall-clock time for this query, in milliseconds
    pub elapsed_ms: f64,
    /// Approximate memory footprint of the whole structure, in bytes
    pub memory_bytes: usize,
    /// Number of records returned (after truncation)
    pub result_count: usize,
}

/// Contract shared by the three name indexes.
///
/// Keys are normalized (trimmed, lowercased) on insertion; prefix
/// queries are normalized the same way, so lookups are case-insensitive
/// end to end.
pub trait PrefixIndex {
    /// Structure name used in errors and artifact names
    fn structure_name(&self) -> &'static str;

    /// Inserts a record under a string key. Duplicate keys accumulate.
    fn insert(&mut self, key: &str, record: Record) -> IndexResult<()>;

    /// All records whose key starts with the prefix, truncated to
    /// `max_results`, plus the measurements for this query.
    fn search_prefix(&self, prefix: &str, max_results: usize) -> (Vec<Record>, SearchMetrics);

    /// Number of stored records.
    fn get_size(&self) -> usize;

    /// Cumulative comparison count across all queries.
    fn total_comparisons(&self) -> u64;

    /// Approximate memory footprint of the structure, in bytes.
    fn memory_estimate(&self) -> usize;

    /// Marks the structure read-only.
    fn freeze(&mut self);

    /// Whether the structure has entered its read-only phase.
    fn is_frozen(&self) -> bool;
}
