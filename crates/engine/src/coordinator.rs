//! Consistency coordinator for the two-store write path
//!
//! The embedding and metadata stores are separate files with no shared
//! transaction, so every write follows a fixed order:
//!
//! - insert / update: metadata first, then embedding
//! - delete: embedding first, then metadata
//!
//! A crash between the two halves therefore leaves one of two shapes:
//! metadata without an embedding (INCOMPLETE, visible to `get`, never to
//! search) or an embedding without metadata (a torn write, removed by
//! recovery on the next open). Neither can surface as a search hit.
//!
//! All validation happens before the first store is touched. Writes to one
//! identifier are serialized by [`IdLockTable`]; different identifiers
//! proceed in parallel.

use crate::locks::IdLockTable;
use std::sync::Arc;
use std::time::Instant;
use svdb_core::{validate_vector, Outcome, Record, RecordId, SvdbError, SvdbResult};
use svdb_storage::{EmbeddingStore, MetadataStore, PutMode};
use tracing::{debug, warn};

/// Sole writer to the embedding and metadata stores
pub struct Coordinator {
    embeddings: Arc<EmbeddingStore>,
    metadata: Arc<MetadataStore>,
    locks: IdLockTable,
}

impl Coordinator {
    /// Create a coordinator over a pair of stores
    pub fn new(embeddings: Arc<EmbeddingStore>, metadata: Arc<MetadataStore>) -> Self {
        Coordinator {
            embeddings,
            metadata,
            locks: IdLockTable::new(),
        }
    }

    /// Insert a new record.
    ///
    /// Inserting over an INCOMPLETE identifier repairs it.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if `id` already has both metadata and an embedding
    /// - `DimensionMismatch` / `InvalidArgument` / `SchemaConflict` on bad input
    /// - `Storage` if either store fails; a failure after the metadata
    ///   write leaves the id INCOMPLETE
    pub fn insert(&self, id: &RecordId, vector: &[f32], record: Record) -> SvdbResult<()> {
        id.validate()?;
        validate_vector(self.embeddings.dimension(), vector)?;
        self.metadata.check(&record)?;

        let start = Instant::now();
        let _guard = self.locks.lock(id);

        let has_metadata = self.metadata.contains(id);
        if has_metadata && self.embeddings.contains(id) {
            return Err(SvdbError::AlreadyExists { id: id.clone() });
        }

        self.metadata.put(id, record, PutMode::Replace)?;
        self.embeddings
            .put(id, vector)
            .map_err(|e| self.second_half_failed("insert", id, e))?;

        debug!(
            target: "svdb::coordinator",
            id = %id,
            repaired = has_metadata,
            elapsed_us = start.elapsed().as_micros() as u64,
            "Inserted"
        );
        Ok(())
    }

    /// Change the embedding, the metadata, or both.
    ///
    /// `mode` controls how `record` combines with the stored metadata.
    /// Returns `NotFound` if `id` has no metadata. Supplying a vector for an
    /// INCOMPLETE id repairs it.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if both `vector` and `record` are `None`; otherwise
    /// as for [`insert`](Self::insert).
    pub fn update(
        &self,
        id: &RecordId,
        vector: Option<&[f32]>,
        record: Option<Record>,
        mode: PutMode,
    ) -> SvdbResult<Outcome> {
        if vector.is_none() && record.is_none() {
            return Err(SvdbError::invalid_argument(
                "update needs a vector, a metadata record, or both",
            ));
        }
        if let Some(v) = vector {
            validate_vector(self.embeddings.dimension(), v)?;
        }
        if let Some(r) = &record {
            self.metadata.check(r)?;
        }

        let start = Instant::now();
        let _guard = self.locks.lock(id);

        if !self.metadata.contains(id) {
            return Ok(Outcome::NotFound);
        }

        if let Some(r) = record {
            self.metadata.put(id, r, mode)?;
        }
        if let Some(v) = vector {
            self.embeddings
                .put(id, v)
                .map_err(|e| self.second_half_failed("update", id, e))?;
        }

        debug!(
            target: "svdb::coordinator",
            id = %id,
            vector = vector.is_some(),
            ?mode,
            elapsed_us = start.elapsed().as_micros() as u64,
            "Updated"
        );
        Ok(Outcome::Applied)
    }

    /// Remove `id` from both stores.
    ///
    /// Returns `NotFound` if neither store holds it.
    pub fn delete(&self, id: &RecordId) -> SvdbResult<Outcome> {
        let start = Instant::now();
        let _guard = self.locks.lock(id);

        let embedding = self.embeddings.delete(id)?;
        let metadata = self.metadata.delete(id).map_err(|e| {
            if embedding.is_applied() {
                warn!(
                    target: "svdb::coordinator",
                    id = %id,
                    error = %e,
                    "Metadata delete failed after embedding delete; id left INCOMPLETE"
                );
            }
            e
        })?;

        if embedding.is_not_found() && metadata.is_not_found() {
            return Ok(Outcome::NotFound);
        }

        debug!(
            target: "svdb::coordinator",
            id = %id,
            elapsed_us = start.elapsed().as_micros() as u64,
            "Deleted"
        );
        Ok(Outcome::Applied)
    }

    fn second_half_failed(&self, op: &str, id: &RecordId, e: SvdbError) -> SvdbError {
        warn!(
            target: "svdb::coordinator",
            op,
            id = %id,
            error = %e,
            "Embedding write failed after metadata write; id left INCOMPLETE"
        );
        e
    }
}
