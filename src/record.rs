//! Record and key handling
//!
//! A record is a flat JSON object: a numeric rating field plus assorted
//! string/boolean fields. Records are never mutated after insertion.
//! Keys are either a floating-point rating or a normalized name string;
//! malformed keys are rejected here, before any structure sees them.

use serde_json::Value;
use thiserror::Error;

/// A stored record: a flat attribute map (numbers, strings, booleans).
pub type Record = Value;

/// Result type for key validation
pub type KeyResult<T> = Result<T, KeyError>;

/// Key validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// Rating key is not a usable number (NaN or infinite)
    #[error("invalid rating key: {value}")]
    InvalidRating {
        /// Textual rendering of the rejected value
        value: String,
    },

    /// String key is empty after normalization
    #[error("empty string key")]
    EmptyKey,
}

/// Validates a rating key before it reaches any structure.
///
/// Fails fast: a rejected key causes no partial mutation anywhere.
pub fn validate_rating(rating: f64) -> KeyResult<f64> {
    if rating.is_finite() {
        Ok(rating)
    } else {
        Err(KeyError::InvalidRating {
            value: rating.to_string(),
        })
    }
}

/// Normalizes a string key for the name indexes (lowercase, trimmed).
pub fn normalize_name(name: &str) -> KeyResult<String> {
    let normalized = name.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(KeyError::EmptyKey);
    }
    Ok(normalized)
}

/// Renders a rating as its digit-trie path key.
///
/// One decimal place, decimal point removed: 4.5 -> "45", 3.0 -> "30",
/// 10.0 -> "100". The digit trie indexes these strings character by
/// character, so the prefix "4" covers every rating in [4.0, 4.9].
pub fn rating_digits(rating: f64) -> String {
    format!("{:.1}", rating).replace('.', "")
}

/// Approximate in-memory footprint of a record, in bytes.
///
/// Used by the prefix indexes for their memory estimates; the rendered
/// JSON length is a stable, implementation-independent proxy.
pub fn approx_record_size(record: &Record) -> usize {
    record.to_string().len()
}
