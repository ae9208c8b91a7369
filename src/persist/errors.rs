//! Persistence error types
//!
//! A missing artifact and a corrupt artifact are distinct conditions and
//! are never collapsed into an empty result.

use std::io;

use thiserror::Error;

/// Result type for persistence operations
pub type PersistResult<T> = Result<T, PersistError>;

/// Errors surfaced by the persistence layer
#[derive(Debug, Error)]
pub enum PersistError {
    /// No artifact exists for the requested dataset/structure pair
    #[error("no saved artifact for dataset '{dataset}', structure '{structure}'")]
    Missing {
        /// Dataset the caller asked for
        dataset: String,
        /// Structure type the caller asked for
        structure: &'static str,
    },

    /// An artifact exists but cannot be trusted: checksum mismatch, parse
    /// failure, out-of-range node index, or a node referenced twice
    #[error("corrupt artifact: {reason}")]
    Corrupt {
        /// What failed to validate
        reason: String,
    },

    /// A snapshot walk exceeded its iteration budget
    #[error("snapshot walk exceeded its iteration budget ({budget})")]
    DepthExceeded {
        /// The budget that was exhausted
        budget: usize,
    },

    /// A structure could not be encoded for storage
    #[error("artifact encoding failed: {0}")]
    Encode(String),

    /// Underlying filesystem failure
    #[error("persistence I/O failure: {context}")]
    Io {
        /// What the layer was doing when the failure occurred
        context: String,
        /// The originating I/O error
        #[source]
        source: io::Error,
    },
}

impl PersistError {
    /// Helper for corrupt-artifact errors.
    pub fn corrupt(reason: impl Into<String>) -> Self {
        PersistError::Corrupt {
            reason: reason.into(),
        }
    }

    /// Helper for I/O errors with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        PersistError::Io {
            context: context.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_and_corrupt_are_distinct() {
        let missing = PersistError::Missing {
            dataset: "airline".to_string(),
            structure: "avl",
        };
        let corrupt = PersistError::corrupt("checksum mismatch");

        assert!(format!("{}", missing).contains("no saved artifact"));
        assert!(format!("{}", corrupt).contains("checksum mismatch"));
    }

    #[test]
    fn test_io_error_preserves_source() {
        let err = PersistError::io(
            "write artifact",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
