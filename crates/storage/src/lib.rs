//! Storage layer for SVDB
//!
//! This crate implements the two physically separate stores that the
//! engine keeps mirrored by record identifier:
//! - EmbeddingStore: id -> fixed-length vector (`embeddings.log`)
//! - MetadataStore: id -> attribute record plus store-wide schema (`metadata.log`)
//!
//! Both are in-memory maps backed by an append-only, CRC-framed log
//! ([`log::LogFile`]) that is replayed on open. Either store can be opened
//! on its own, which is what startup recovery relies on.
//!
//! # Writers
//!
//! Mutating methods are public so the engine crate can call them, but the
//! engine's consistency coordinator is their only caller in an assembled
//! database. Writing to one store directly bypasses the two-store protocol.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod embedding;
pub mod log;
pub mod metadata;
pub mod schema;

pub use embedding::{EmbeddingSnapshot, EmbeddingStore, Vector, EMBEDDINGS_FILE};
pub use log::{Durability, LogFile, LogReplay};
pub use metadata::{MetadataStore, PutMode, METADATA_FILE};
pub use schema::Schema;
