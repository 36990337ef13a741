//! Core types for SVDB
//!
//! This crate defines the foundational types shared by the storage and
//! engine crates:
//! - RecordId: the join key between the embedding and metadata stores
//! - Value / Record / FieldType: metadata records and their schema types
//! - Metric: similarity metrics, normalized to "higher = more similar"
//! - Filter: metadata predicates evaluated during search
//! - SvdbError: the error taxonomy
//! - Embedder: the boundary to an external embedding model

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod embed;
pub mod error;
pub mod filter;
pub mod metric;
pub mod types;
pub mod value;

pub use embed::Embedder;
pub use error::{SvdbError, SvdbResult};
pub use filter::Filter;
pub use metric::Metric;
pub use types::{validate_vector, Outcome, RecordId, MAX_DIMENSION};
pub use value::{FieldType, Record, Value};
