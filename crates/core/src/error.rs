//! Error types for SVDB
//!
//! Every fallible operation returns a typed, inspectable [`SvdbError`].
//! "Not found" is deliberately absent: lookups return `Option` and
//! mutations return [`Outcome`](crate::Outcome).

use crate::types::RecordId;
use crate::value::FieldType;
use std::io;
use thiserror::Error;

/// Result type alias for SVDB operations
pub type SvdbResult<T> = std::result::Result<T, SvdbError>;

/// Error types for SVDB
#[derive(Debug, Error)]
pub enum SvdbError {
    /// Vector length does not match the store dimension
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Dimension fixed at store creation
        expected: usize,
        /// Length of the offending vector
        got: usize,
    },

    /// Metadata field written with a type that conflicts with the schema
    #[error("Schema conflict on field '{field}': schema has {expected}, got {got}")]
    SchemaConflict {
        /// Field name
        field: String,
        /// Type recorded in the schema
        expected: FieldType,
        /// Type of the rejected value
        got: FieldType,
    },

    /// Caller supplied an invalid argument (k = 0, unknown metric, ...)
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong
        message: String,
    },

    /// Insert of an identifier that already has a complete record
    #[error("Record already exists: {id}")]
    AlreadyExists {
        /// The identifier
        id: RecordId,
    },

    /// Identifier has metadata but no embedding
    #[error("Record {id} is incomplete: metadata present, embedding missing")]
    Incomplete {
        /// The identifier
        id: RecordId,
    },

    /// Underlying store unreachable or failing
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the failed operation
        message: String,
        /// Underlying I/O error, if any
        #[source]
        source: Option<io::Error>,
    },

    /// Persisted data failed validation
    #[error("Data corruption: {message}")]
    Corruption {
        /// What was corrupt
        message: String,
    },

    /// Encoding or decoding of a persisted entry failed
    #[error("Serialization error: {message}")]
    Serialization {
        /// Codec message
        message: String,
    },
}

impl SvdbError {
    /// Build an `InvalidArgument` error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        SvdbError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Build a `Storage` error without an I/O source
    pub fn storage(message: impl Into<String>) -> Self {
        SvdbError::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Build a `Storage` error wrapping an I/O error with context
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        SvdbError::Storage {
            message: format!("{}: {}", context.into(), source),
            source: Some(source),
        }
    }

    /// Build a `Corruption` error
    pub fn corruption(message: impl Into<String>) -> Self {
        SvdbError::Corruption {
            message: message.into(),
        }
    }

    /// Check if this error was raised before any store was touched
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            SvdbError::DimensionMismatch { .. }
                | SvdbError::SchemaConflict { .. }
                | SvdbError::InvalidArgument { .. }
                | SvdbError::AlreadyExists { .. }
        )
    }

    /// Check if this error came from the persistence layer
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            SvdbError::Storage { .. } | SvdbError::Corruption { .. } | SvdbError::Serialization { .. }
        )
    }
}

impl From<io::Error> for SvdbError {
    fn from(e: io::Error) -> Self {
        SvdbError::Storage {
            message: e.to_string(),
            source: Some(e),
        }
    }
}

impl From<rmp_serde::encode::Error> for SvdbError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        SvdbError::Serialization {
            message: e.to_string(),
        }
    }
}

impl From<rmp_serde::decode::Error> for SvdbError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        SvdbError::Serialization {
            message: e.to_string(),
        }
    }
}
