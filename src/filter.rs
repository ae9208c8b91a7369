//! Filter engine
//!
//! Every rating-keyed structure exposes the same capability interface:
//! structure-assisted rating-range filtering, linear-scan field filtering,
//! and conjunctive multi-criteria filtering. Value comparison is strict:
//! no cross-type coercion, numeric and string ordering only.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::record::{KeyError, Record};

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors surfaced by index operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndexError {
    /// Key validation failure (non-numeric rating, empty string key)
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Insertion attempted after the structure was frozen
    #[error("structure '{structure}' is frozen")]
    Frozen {
        /// Name of the structure that rejected the insert
        structure: &'static str,
    },

    /// A filter named a field that no stored record carries
    #[error("unknown filter field: {field}")]
    UnknownField {
        /// The field name that matched nothing
        field: String,
    },
}

/// A single-field filter predicate, evaluated against record fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldPredicate {
    /// Exact equality, no coercion
    Equals(Value),
    /// Inclusive range over numbers or strings
    Range {
        /// Lower bound (inclusive)
        min: Value,
        /// Upper bound (inclusive)
        max: Value,
    },
    /// Case-insensitive substring match
    Contains(String),
    /// Strictly greater than the bound
    GreaterThan(Value),
    /// Strictly less than the bound
    LessThan(Value),
}

impl FieldPredicate {
    /// Whether a field value satisfies this predicate.
    ///
    /// Null never matches. Numbers compare with numbers, strings with
    /// strings; any cross-type comparison is false.
    pub fn matches(&self, actual: &Value) -> bool {
        if actual.is_null() {
            return false;
        }

        match self {
            FieldPredicate::Equals(expected) => actual == expected,
            FieldPredicate::Range { min, max } => {
                matches!(compare(actual, min), Some(o) if o.is_ge())
                    && matches!(compare(actual, max), Some(o) if o.is_le())
            }
            FieldPredicate::Contains(needle) => {
                text_of(actual).to_lowercase().contains(&needle.to_lowercase())
            }
            FieldPredicate::GreaterThan(bound) => {
                matches!(compare(actual, bound), Some(o) if o.is_gt())
            }
            FieldPredicate::LessThan(bound) => {
                matches!(compare(actual, bound), Some(o) if o.is_lt())
            }
        }
    }
}

/// Strict comparison between two JSON values.
///
/// Numbers compare as f64, strings lexicographically; everything else is
/// incomparable and returns None.
fn compare(actual: &Value, bound: &Value) -> Option<std::cmp::Ordering> {
    match (actual, bound) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64()?;
            let b = b.as_f64()?;
            a.partial_cmp(&b)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Textual rendering of a value for substring matching.
fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Bounds for the indexed rating filter; a missing bound is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingBounds {
    /// Minimum rating (inclusive)
    pub min: Option<f64>,
    /// Maximum rating (inclusive)
    pub max: Option<f64>,
}

/// Conjunctive multi-criteria filter specification.
///
/// The rating bounds are applied first, through the index, to shrink the
/// candidate set; field predicates then refine it sequentially.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Indexed rating bounds, applied first when present
    pub rating: Option<RatingBounds>,
    /// Field predicates applied as sequential refinements
    pub fields: Vec<(String, FieldPredicate)>,
}

/// Capability interface implemented by every rating-keyed structure.
///
/// The filter engine and the persistence layer depend only on this
/// interface, never on concrete node shapes. Structures are built by
/// repeated insertion, then frozen; every query is a pure read.
pub trait RatingIndex {
    /// Structure name used in errors and artifact names
    fn structure_name(&self) -> &'static str;

    /// Inserts a record under a rating key. Duplicate keys accumulate;
    /// nothing is replaced.
    fn insert(&mut self, rating: f64, record: Record) -> IndexResult<()>;

    /// All records whose key equals the argument exactly.
    fn search(&self, rating: f64) -> Vec<Record>;

    /// All records with key in [min, max], inclusive. An inverted range
    /// (min > max) is empty.
    fn get_range(&self, min: f64, max: f64) -> Vec<Record>;

    /// The k records with greatest key, sorted descending by key.
    fn get_top_k(&self, k: usize) -> Vec<Record>;

    /// Structure height (0 for flat structures).
    fn get_height(&self) -> usize;

    /// Number of stored records.
    fn get_size(&self) -> usize;

    /// All stored records, in the structure's natural traversal order.
    fn all_records(&self) -> Vec<Record>;

    /// Marks the structure read-only; later insertions fail with
    /// [`IndexError::Frozen`].
    fn freeze(&mut self);

    /// Whether the structure has entered its read-only phase.
    fn is_frozen(&self) -> bool;

    /// Rating-range filter; missing bounds default to +/- infinity.
    fn filter_by_rating(&self, min: Option<f64>, max: Option<f64>) -> Vec<Record> {
        self.get_range(
            min.unwrap_or(f64::NEG_INFINITY),
            max.unwrap_or(f64::INFINITY),
        )
    }

    /// Linear-scan filter over an arbitrary, non-indexed field.
    ///
    /// Errors with [`IndexError::UnknownField`] when no stored record
    /// carries the field at all; a present-but-nowhere-matching field
    /// returns an empty result.
    fn filter_by_field(&self, field: &str, predicate: &FieldPredicate) -> IndexResult<Vec<Record>> {
        let mut seen_field = false;
        let mut results = Vec::new();

        for record in self.all_records() {
            let matched = match record.get(field) {
                Some(value) => {
                    seen_field = true;
                    predicate.matches(value)
                }
                None => false,
            };
            if matched {
                results.push(record);
            }
        }

        if !seen_field {
            return Err(IndexError::UnknownField {
                field: field.to_string(),
            });
        }
        Ok(results)
    }

    /// Conjunctive multi-criteria filter.
    ///
    /// The rating filter runs first (through the index) when present;
    /// each field predicate then refines the shrinking candidate set. A
    /// field that none of the current candidates carry is reported as
    /// [`IndexError::UnknownField`], never silently skipped.
    fn filter_multi_criteria(&self, spec: &FilterSpec) -> IndexResult<Vec<Record>> {
        let mut results = match &spec.rating {
            Some(bounds) => self.filter_by_rating(bounds.min, bounds.max),
            None => self.all_records(),
        };

        for (field, predicate) in &spec.fields {
            if results.is_empty() {
                break;
            }
            let mut seen_field = false;
            results.retain(|record| match record.get(field) {
                Some(value) => {
                    seen_field = true;
                    predicate.matches(value)
                }
                None => false,
            });
            if !seen_field {
                return Err(IndexError::UnknownField {
                    field: field.clone(),
                });
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equals_no_coercion() {
        let pred = FieldPredicate::Equals(json!(123));
        assert!(pred.matches(&json!(123)));
        assert!(!pred.matches(&json!("123")));
    }

    #[test]
    fn test_null_never_matches() {
        let pred = FieldPredicate::Equals(json!(null));
        assert!(!pred.matches(&json!(null)));
    }

    #[test]
    fn test_range_inclusive() {
        let pred = FieldPredicate::Range {
            min: json!(3.0),
            max: json!(4.5),
        };
        assert!(pred.matches(&json!(3.0)));
        assert!(pred.matches(&json!(4.5)));
        assert!(!pred.matches(&json!(2.9)));
        assert!(!pred.matches(&json!("3.5")));
    }

    #[test]
    fn test_contains_case_insensitive() {
        let pred = FieldPredicate::Contains("business".to_string());
        assert!(pred.matches(&json!("Business Class")));
        assert!(!pred.matches(&json!("Economy")));
    }

    #[test]
    fn test_contains_renders_non_strings() {
        let pred = FieldPredicate::Contains("true".to_string());
        assert!(pred.matches(&json!(true)));
    }

    #[test]
    fn test_greater_less_than() {
        assert!(FieldPredicate::GreaterThan(json!(4.0)).matches(&json!(4.5)));
        assert!(!FieldPredicate::GreaterThan(json!(4.0)).matches(&json!(4.0)));
        assert!(FieldPredicate::LessThan(json!("delta")).matches(&json!("alpha")));
    }

    /// Minimal vec-backed implementor used to exercise the provided
    /// filter methods.
    struct ScanIndex {
        entries: Vec<(f64, Record)>,
        frozen: bool,
    }

    impl ScanIndex {
        fn new() -> Self {
            Self {
                entries: Vec::new(),
                frozen: false,
            }
        }
    }

    impl RatingIndex for ScanIndex {
        fn structure_name(&self) -> &'static str {
            "scan"
        }

        fn insert(&mut self, rating: f64, record: Record) -> IndexResult<()> {
            if self.frozen {
                return Err(IndexError::Frozen { structure: "scan" });
            }
            self.entries.push((crate::record::validate_rating(rating)?, record));
            Ok(())
        }

        fn search(&self, rating: f64) -> Vec<Record> {
            self.entries
                .iter()
                .filter(|(r, _)| *r == rating)
                .map(|(_, rec)| rec.clone())
                .collect()
        }

        fn get_range(&self, min: f64, max: f64) -> Vec<Record> {
            self.entries
                .iter()
                .filter(|(r, _)| min <= *r && *r <= max)
                .map(|(_, rec)| rec.clone())
                .collect()
        }

        fn get_top_k(&self, k: usize) -> Vec<Record> {
            let mut all = self.entries.clone();
            all.sort_by(|a, b| b.0.total_cmp(&a.0));
            all.into_iter().take(k).map(|(_, rec)| rec).collect()
        }

        fn get_height(&self) -> usize {
            0
        }

        fn get_size(&self) -> usize {
            self.entries.len()
        }

        fn all_records(&self) -> Vec<Record> {
            self.entries.iter().map(|(_, rec)| rec.clone()).collect()
        }

        fn freeze(&mut self) {
            self.frozen = true;
        }

        fn is_frozen(&self) -> bool {
            self.frozen
        }
    }

    fn sample_index() -> ScanIndex {
        let mut index = ScanIndex::new();
        index
            .insert(4.5, json!({"name": "A", "recommended": true, "cabin": "Business Class"}))
            .unwrap();
        index
            .insert(3.0, json!({"name": "B", "recommended": false, "cabin": "Economy"}))
            .unwrap();
        index
            .insert(5.0, json!({"name": "C", "recommended": true, "cabin": "First Class"}))
            .unwrap();
        index
    }

    #[test]
    fn test_filter_by_rating_defaults_to_unbounded() {
        let index = sample_index();
        assert_eq!(index.filter_by_rating(None, None).len(), 3);
        assert_eq!(index.filter_by_rating(Some(4.0), None).len(), 2);
        assert_eq!(index.filter_by_rating(None, Some(4.0)).len(), 1);
    }

    #[test]
    fn test_filter_by_field() {
        let index = sample_index();
        let results = index
            .filter_by_field("recommended", &FieldPredicate::Equals(json!(true)))
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_filter_by_field_unknown_field_errors() {
        let index = sample_index();
        let err = index
            .filter_by_field("no_such_field", &FieldPredicate::Equals(json!(1)))
            .unwrap_err();
        assert_eq!(
            err,
            IndexError::UnknownField {
                field: "no_such_field".to_string()
            }
        );
    }

    #[test]
    fn test_filter_multi_criteria_rating_first() {
        let index = sample_index();
        let spec = FilterSpec {
            rating: Some(RatingBounds {
                min: Some(4.0),
                max: Some(5.0),
            }),
            fields: vec![(
                "cabin".to_string(),
                FieldPredicate::Contains("class".to_string()),
            )],
        };
        let results = index.filter_multi_criteria(&spec).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_filter_multi_criteria_empty_candidates_short_circuit() {
        let index = sample_index();
        let spec = FilterSpec {
            rating: Some(RatingBounds {
                min: Some(9.0),
                max: Some(10.0),
            }),
            // Unknown field is never reached: the candidate set is empty.
            fields: vec![("bogus".to_string(), FieldPredicate::Equals(json!(1)))],
        };
        assert!(index.filter_multi_criteria(&spec).unwrap().is_empty());
    }

    #[test]
    fn test_frozen_rejects_insert() {
        let mut index = sample_index();
        index.freeze();
        assert!(index.is_frozen());
        let err = index.insert(1.0, json!({})).unwrap_err();
        assert_eq!(err, IndexError::Frozen { structure: "scan" });
    }
}
