//! Database engine for SVDB
//!
//! This crate orchestrates the storage layer:
//! - Database: store directory, config, process lock, open/recovery
//! - Coordinator: ordered two-store writes, per-identifier serialization
//! - Recovery: torn-write cleanup and INCOMPLETE detection on open
//! - SimilarityEngine: exact top-k search with metadata filters
//!
//! The engine is the only component that writes to both stores, and the
//! only one that knows the ordering rules that keep them consistent.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coordinator;
pub mod database;
mod locks;
pub mod recovery;
pub mod search;

pub use coordinator::Coordinator;
pub use database::{Database, Entry, EntryState, SvdbConfig, CONFIG_FILE_NAME};
pub use recovery::RecoveryReport;
pub use search::{compute_score, SearchHit, SimilarityEngine};
pub use svdb_storage::{Durability, PutMode, Schema, Vector};
