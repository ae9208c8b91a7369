//! Bucket hash map over rating keys
//!
//! The rating is scaled to an integer (one decimal place) before
//! hashing, so 4.5 always lands in the same bucket regardless of
//! floating-point noise upstream. Buckets chain (key, records) entries;
//! a full rehash into double the capacity runs when the distinct-key
//! count crosses the load factor. Range queries scan every bucket: this
//! structure trades ordered access for O(1) exact lookup.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::filter::{IndexError, IndexResult, RatingIndex};
use crate::persist::errors::{PersistError, PersistResult};
use crate::persist::snapshot::HashMapSnapshot;
use crate::record::{validate_rating, Record};

const DEFAULT_CAPACITY: usize = 16;
const DEFAULT_LOAD_FACTOR: f64 = 0.75;

#[derive(Debug, Clone)]
struct BucketEntry {
    rating: f64,
    records: Vec<Record>,
}

/// Chained bucket hash map keyed by rating.
#[derive(Debug)]
pub struct BucketMap {
    buckets: Vec<Vec<BucketEntry>>,
    capacity: usize,
    load_factor: f64,
    distinct_keys: usize,
    size: usize,
    frozen: bool,
}

impl Default for BucketMap {
    fn default() -> Self {
        Self::new()
    }
}

impl BucketMap {
    /// Creates a map with the default capacity and load factor.
    pub fn new() -> Self {
        Self::with_capacity_and_load_factor(DEFAULT_CAPACITY, DEFAULT_LOAD_FACTOR)
    }

    /// Creates a map with an explicit starting capacity and load factor.
    pub fn with_capacity_and_load_factor(capacity: usize, load_factor: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            buckets: vec![Vec::new(); capacity],
            capacity,
            load_factor,
            distinct_keys: 0,
            size: 0,
            frozen: false,
        }
    }

    /// Current bucket count.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of distinct rating keys stored.
    pub fn distinct_keys(&self) -> usize {
        self.distinct_keys
    }

    fn bucket_index(&self, rating: f64) -> usize {
        Self::bucket_for(rating, self.capacity)
    }

    fn bucket_for(rating: f64, capacity: usize) -> usize {
        // One-decimal scaling keeps equal keys hashing identically.
        let scaled = (rating * 10.0).round() as i64;
        let mut hasher = DefaultHasher::new();
        scaled.hash(&mut hasher);
        (hasher.finish() % capacity as u64) as usize
    }

    fn resize(&mut self) {
        let new_capacity = self.capacity * 2;
        let mut new_buckets: Vec<Vec<BucketEntry>> = vec![Vec::new(); new_capacity];
        for bucket in self.buckets.drain(..) {
            for entry in bucket {
                let idx = Self::bucket_for(entry.rating, new_capacity);
                new_buckets[idx].push(entry);
            }
        }
        self.buckets = new_buckets;
        self.capacity = new_capacity;
    }

    /// All (rating, records) pairs in bucket-scan order.
    fn entries(&self) -> Vec<(f64, Vec<Record>)> {
        self.buckets
            .iter()
            .flatten()
            .map(|entry| (entry.rating, entry.records.clone()))
            .collect()
    }

    /// Dumps the table, preserving capacity and load factor so the
    /// rebuilt map hashes identically.
    pub fn to_snapshot(&self) -> PersistResult<HashMapSnapshot> {
        Ok(HashMapSnapshot {
            capacity: self.capacity,
            load_factor: self.load_factor,
            entries: self.entries(),
        })
    }

    /// Rebuilds the table from a snapshot, rehashing every entry into
    /// the saved capacity.
    pub fn from_snapshot(snapshot: HashMapSnapshot) -> PersistResult<Self> {
        if snapshot.capacity == 0 {
            return Err(PersistError::corrupt("hash-map capacity is zero"));
        }
        if !(snapshot.load_factor > 0.0 && snapshot.load_factor <= 1.0) {
            return Err(PersistError::corrupt(format!(
                "hash-map load factor {} out of range",
                snapshot.load_factor
            )));
        }

        let mut map = Self::with_capacity_and_load_factor(snapshot.capacity, snapshot.load_factor);
        for (rating, records) in snapshot.entries {
            if !rating.is_finite() {
                return Err(PersistError::corrupt(format!(
                    "hash-map entry has non-finite key {}",
                    rating
                )));
            }
            let idx = map.bucket_index(rating);
            if map.buckets[idx].iter().any(|e| e.rating == rating) {
                return Err(PersistError::corrupt(format!(
                    "hash-map key {} appears twice",
                    rating
                )));
            }
            map.size += records.len();
            map.distinct_keys += 1;
            map.buckets[idx].push(BucketEntry { rating, records });
        }
        Ok(map)
    }
}

impl RatingIndex for BucketMap {
    fn structure_name(&self) -> &'static str {
        "hash_map"
    }

    fn insert(&mut self, rating: f64, record: Record) -> IndexResult<()> {
        if self.frozen {
            return Err(IndexError::Frozen {
                structure: "hash_map",
            });
        }
        let rating = validate_rating(rating)?;

        // Resize check runs before insertion, on distinct keys: chained
        // duplicates lengthen one entry, not the table.
        if self.distinct_keys as f64 / self.capacity as f64 >= self.load_factor {
            self.resize();
        }

        let idx = self.bucket_index(rating);
        let bucket = &mut self.buckets[idx];
        match bucket.iter_mut().find(|e| e.rating == rating) {
            Some(entry) => entry.records.push(record),
            None => {
                bucket.push(BucketEntry {
                    rating,
                    records: vec![record],
                });
                self.distinct_keys += 1;
            }
        }
        self.size += 1;
        Ok(())
    }

    fn search(&self, rating: f64) -> Vec<Record> {
        if !rating.is_finite() {
            return Vec::new();
        }
        let idx = self.bucket_index(rating);
        self.buckets[idx]
            .iter()
            .find(|e| e.rating == rating)
            .map(|e| e.records.clone())
            .unwrap_or_default()
    }

    fn get_range(&self, min: f64, max: f64) -> Vec<Record> {
        // No structural pruning here: every bucket is visited.
        let mut results = Vec::new();
        for bucket in &self.buckets {
            for entry in bucket {
                if min <= entry.rating && entry.rating <= max {
                    results.extend(entry.records.iter().cloned());
                }
            }
        }
        results
    }

    fn get_top_k(&self, k: usize) -> Vec<Record> {
        let mut all: Vec<(f64, Record)> = Vec::with_capacity(self.size);
        for (rating, records) in self.entries() {
            for record in records {
                all.push((rating, record));
            }
        }
        all.sort_by(|a, b| b.0.total_cmp(&a.0));
        all.into_iter().take(k).map(|(_, record)| record).collect()
    }

    fn get_height(&self) -> usize {
        0
    }

    fn get_size(&self) -> usize {
        self.size
    }

    fn all_records(&self) -> Vec<Record> {
        self.entries()
            .into_iter()
            .flat_map(|(_, records)| records)
            .collect()
    }

    fn freeze(&mut self) {
        self.frozen = true;
    }

    fn is_frozen(&self) -> bool {
        self.frozen
    }
}
