//! Identifier and vector types
//!
//! - RecordId: opaque key joining the embedding and metadata stores
//! - Outcome: the non-error result of a mutation that may find nothing
//! - validate_vector: the single dimension/finiteness check used by every write path

use crate::error::{SvdbError, SvdbResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest dimension a store may be created with
pub const MAX_DIMENSION: usize = 65536;

/// Record identifier
///
/// Either an unsigned integer or a string. The derived ordering puts every
/// integer (numeric order) before every string (lexical byte order); search
/// uses this ordering to break score ties.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordId {
    /// Integer identifier
    Int(u64),
    /// String identifier
    Str(String),
}

impl RecordId {
    /// Reject identifiers that cannot be stored (empty strings)
    pub fn validate(&self) -> SvdbResult<()> {
        match self {
            RecordId::Str(s) if s.is_empty() => {
                Err(SvdbError::invalid_argument("record id must not be empty"))
            }
            _ => Ok(()),
        }
    }

    /// The string form, if this is a string identifier
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RecordId::Str(s) => Some(s),
            RecordId::Int(_) => None,
        }
    }

    /// The integer form, if this is an integer identifier
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            RecordId::Int(n) => Some(*n),
            RecordId::Str(_) => None,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(n) => write!(f, "{}", n),
            RecordId::Str(s) => f.write_str(s),
        }
    }
}

impl From<u64> for RecordId {
    fn from(v: u64) -> Self {
        RecordId::Int(v)
    }
}

impl From<u32> for RecordId {
    fn from(v: u32) -> Self {
        RecordId::Int(v as u64)
    }
}

impl From<i32> for RecordId {
    fn from(v: i32) -> Self {
        // Negative literals have no integer form; keep them as text
        if v < 0 {
            RecordId::Str(v.to_string())
        } else {
            RecordId::Int(v as u64)
        }
    }
}

impl From<String> for RecordId {
    fn from(v: String) -> Self {
        RecordId::Str(v)
    }
}

impl From<&str> for RecordId {
    fn from(v: &str) -> Self {
        RecordId::Str(v.to_string())
    }
}

impl From<&RecordId> for RecordId {
    fn from(v: &RecordId) -> Self {
        v.clone()
    }
}

/// Result of a mutation on a single identifier
///
/// `NotFound` is an expected outcome, not an error.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The mutation was applied
    Applied,
    /// The identifier did not exist; nothing changed
    NotFound,
}

impl Outcome {
    /// True if the mutation was applied
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }

    /// True if the identifier was absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Outcome::NotFound)
    }
}

/// Validate a vector against a store dimension
///
/// Rejects wrong lengths with `DimensionMismatch` and NaN/infinite
/// components with `InvalidArgument`. Scores computed from finite vectors
/// are never NaN, which top-k selection relies on.
pub fn validate_vector(dimension: usize, vector: &[f32]) -> SvdbResult<()> {
    if vector.len() != dimension {
        return Err(SvdbError::DimensionMismatch {
            expected: dimension,
            got: vector.len(),
        });
    }
    if let Some(pos) = vector.iter().position(|x| !x.is_finite()) {
        return Err(SvdbError::invalid_argument(format!(
            "vector component {} is not finite",
            pos
        )));
    }
    Ok(())
}
