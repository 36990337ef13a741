//! Embedding-driven ingestion
//!
//! The database never embeds content itself. [`Ingestor`] pairs a
//! [`Database`] with an [`Embedder`] so callers can write and search by
//! content, and re-derive vectors for INCOMPLETE records.

use svdb_core::{Embedder, Filter, Metric, Outcome, Record, RecordId, SvdbError, SvdbResult};
use svdb_engine::{Database, SearchHit};
use tracing::{debug, info};

/// Result of [`Ingestor::repair_incomplete`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairSummary {
    /// Records that received an embedding
    pub repaired: usize,
    /// Records with no source content, or deleted before repair
    pub skipped: usize,
}

/// Writes and searches a database by content
pub struct Ingestor<'db, E> {
    db: &'db Database,
    embedder: E,
}

impl<'db, E: Embedder> Ingestor<'db, E> {
    /// Pair `embedder` with `db`.
    ///
    /// Fails with `DimensionMismatch` if the embedder's output length is not
    /// the database dimension.
    pub fn new(db: &'db Database, embedder: E) -> SvdbResult<Self> {
        if embedder.dimension() != db.dimension() {
            return Err(SvdbError::DimensionMismatch {
                expected: db.dimension(),
                got: embedder.dimension(),
            });
        }
        Ok(Ingestor { db, embedder })
    }

    /// Embed `content` and insert it under `id`
    pub fn insert(&self, id: impl Into<RecordId>, content: &str, record: Record) -> SvdbResult<()> {
        let vector = self.embedder.embed(content)?;
        self.db.insert(id, &vector, record)
    }

    /// Embed every item in one batch, then insert them in order.
    ///
    /// Stops at the first failed insert; earlier items stay inserted.
    pub fn insert_batch(&self, items: Vec<(RecordId, &str, Record)>) -> SvdbResult<usize> {
        let contents: Vec<&str> = items.iter().map(|(_, c, _)| *c).collect();
        let vectors = self.embedder.embed_batch(&contents)?;
        if vectors.len() != items.len() {
            return Err(SvdbError::invalid_argument(format!(
                "embedder returned {} vectors for {} inputs",
                vectors.len(),
                items.len()
            )));
        }

        let mut inserted = 0;
        for ((id, _, record), vector) in items.into_iter().zip(vectors) {
            self.db.insert(id, &vector, record)?;
            inserted += 1;
        }
        debug!(target: "svdb::ingest", inserted, "Batch inserted");
        Ok(inserted)
    }

    /// Re-embed and/or update metadata for an existing record
    pub fn update(
        &self,
        id: impl Into<RecordId>,
        content: Option<&str>,
        record: Option<Record>,
    ) -> SvdbResult<Outcome> {
        let vector = content.map(|c| self.embedder.embed(c)).transpose()?;
        self.db.update(id, vector.as_deref(), record)
    }

    /// Embed `content` and search for it
    pub fn search(
        &self,
        content: &str,
        metric: Metric,
        k: usize,
        filter: Option<&Filter>,
    ) -> SvdbResult<Vec<SearchHit>> {
        let query = self.embedder.embed(content)?;
        self.db.search(&query, metric, k, filter)
    }

    /// Give every INCOMPLETE record an embedding.
    ///
    /// `source` returns the content to embed for a record, or `None` to
    /// leave it INCOMPLETE.
    pub fn repair_incomplete<F>(&self, mut source: F) -> SvdbResult<RepairSummary>
    where
        F: FnMut(&RecordId, &Record) -> Option<String>,
    {
        let mut summary = RepairSummary::default();
        for id in self.db.incomplete() {
            let Some(entry) = self.db.get(id.clone()) else {
                continue;
            };
            match source(&id, &entry.record) {
                Some(content) => {
                    let vector = self.embedder.embed(&content)?;
                    if self.db.update(id, Some(&vector), None)?.is_applied() {
                        summary.repaired += 1;
                    } else {
                        // Deleted since the scan
                        summary.skipped += 1;
                    }
                }
                None => summary.skipped += 1,
            }
        }

        info!(
            target: "svdb::ingest",
            repaired = summary.repaired,
            skipped = summary.skipped,
            "Repaired incomplete records"
        );
        Ok(summary)
    }
}
