//! SVDB - a minimal embedded vector database
//!
//! SVDB stores fixed-length embeddings alongside structured metadata and
//! answers exact top-k similarity queries, optionally filtered on metadata.
//!
//! # Quick Start
//!
//! ```
//! use svdb::{record, Database, Filter, Metric};
//!
//! let db = Database::ephemeral(2)?;
//! db.insert("a", &[1.0, 0.0], record! { "type" => "doc" })?;
//! db.insert("b", &[0.0, 1.0], record! { "type" => "img" })?;
//!
//! let hits = db.search(&[0.9, 0.1], Metric::Cosine, 2, Some(&Filter::eq("type", "doc")))?;
//! assert_eq!(hits.len(), 1);
//! assert_eq!(hits[0].id, svdb::RecordId::from("a"));
//! # Ok::<(), svdb::SvdbError>(())
//! ```
//!
//! # Architecture
//!
//! - `svdb-core`: identifiers, metadata values, filters, metrics, errors
//! - `svdb-storage`: the embedding and metadata stores and their logs
//! - `svdb-engine`: the [`Database`] facade, write coordination, recovery
//!   and search
//!
//! This crate re-exports the public surface of all three and adds
//! [`logging`] setup and an embedding-driven [`Ingestor`].

pub mod ingest;
pub mod logging;

pub use ingest::{Ingestor, RepairSummary};

pub use svdb_core::{
    record, validate_vector, Embedder, FieldType, Filter, Metric, Outcome, Record, RecordId,
    SvdbError, SvdbResult, Value, MAX_DIMENSION,
};
pub use svdb_engine::{
    Database, Durability, Entry, EntryState, PutMode, RecoveryReport, Schema, SearchHit,
    SvdbConfig, Vector, CONFIG_FILE_NAME,
};
