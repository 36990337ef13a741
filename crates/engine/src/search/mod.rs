//! Similarity Engine: exact top-k search over the embedding snapshot
//!
//! The engine reads both stores and never mutates them. A query:
//! 1. validates k and the query vector
//! 2. takes an embedding snapshot
//! 3. admits a candidate only if its metadata exists and satisfies the
//!    filter (INCOMPLETE ids have no embedding and never appear)
//! 4. scores admitted candidates into a bounded min-heap, each carrying
//!    the exact record the filter accepted
//! 5. returns the winners with those records
//!
//! Large snapshots are scored in parallel chunks on the rayon pool. Each
//! chunk keeps its own heap and the heaps are merged, so the result is the
//! same as the sequential scan.

mod distance;
mod topk;

pub use distance::compute_score;

use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use svdb_core::{validate_vector, Filter, Metric, Record, RecordId, SvdbError, SvdbResult};
use svdb_storage::{EmbeddingSnapshot, EmbeddingStore, MetadataStore};
use topk::{Candidate, TopK};
use tracing::debug;

/// Minimum number of vectors per parallel chunk
const MIN_CHUNK: usize = 1024;

/// One search result
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Record identifier
    pub id: RecordId,
    /// Normalized score (higher = more similar)
    pub score: f32,
    /// Metadata record at the time of the query
    pub record: Record,
}

/// Exact brute-force search over an embedding store
pub struct SimilarityEngine {
    embeddings: Arc<EmbeddingStore>,
    metadata: Arc<MetadataStore>,
    parallel_threshold: usize,
}

impl SimilarityEngine {
    /// Create an engine reading from the given stores.
    ///
    /// Snapshots with at least `parallel_threshold` vectors are scanned in
    /// parallel.
    pub fn new(
        embeddings: Arc<EmbeddingStore>,
        metadata: Arc<MetadataStore>,
        parallel_threshold: usize,
    ) -> Self {
        SimilarityEngine {
            embeddings,
            metadata,
            parallel_threshold,
        }
    }

    /// The `k` best matches for `query`, best first.
    ///
    /// Returns fewer than `k` hits when fewer records qualify. Ties are
    /// broken by identifier ascending.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `k == 0` or the query has non-finite components
    /// - `DimensionMismatch` if the query length differs from the store dimension
    pub fn search(
        &self,
        query: &[f32],
        metric: Metric,
        k: usize,
        filter: Option<&Filter>,
    ) -> SvdbResult<Vec<SearchHit>> {
        if k == 0 {
            return Err(SvdbError::invalid_argument("k must be greater than 0"));
        }
        validate_vector(self.embeddings.dimension(), query)?;

        let start = Instant::now();
        let snapshot = self.embeddings.scan();
        let parallel = snapshot.len() >= self.parallel_threshold;
        let winners = if parallel {
            self.scan_parallel(&snapshot, query, metric, k, filter)
        } else {
            self.scan_sequential(&snapshot, query, metric, k, filter)
        };

        let hits: Vec<SearchHit> = winners
            .into_iter()
            .map(|c| SearchHit {
                id: c.id.clone(),
                score: c.score,
                record: Arc::try_unwrap(c.record)
                    .unwrap_or_else(|shared| Record::clone(&shared)),
            })
            .collect();

        debug!(
            target: "svdb::search",
            %metric,
            k,
            scanned = snapshot.len(),
            parallel,
            filtered = filter.is_some(),
            hits = hits.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Search complete"
        );
        Ok(hits)
    }

    fn admit(&self, id: &RecordId, filter: Option<&Filter>) -> Option<Arc<Record>> {
        self.metadata.get_if(id, filter)
    }

    fn scan_sequential<'a>(
        &self,
        snapshot: &'a EmbeddingSnapshot,
        query: &[f32],
        metric: Metric,
        k: usize,
        filter: Option<&Filter>,
    ) -> Vec<Candidate<'a>> {
        let mut top = TopK::new(k);
        for (id, vector) in snapshot.iter() {
            if let Some(record) = self.admit(id, filter) {
                top.push(Candidate {
                    score: compute_score(query, vector, metric),
                    id,
                    record,
                });
            }
        }
        top.into_sorted_vec()
    }

    fn scan_parallel<'a>(
        &self,
        snapshot: &'a EmbeddingSnapshot,
        query: &[f32],
        metric: Metric,
        k: usize,
        filter: Option<&Filter>,
    ) -> Vec<Candidate<'a>> {
        let chunk = (snapshot.len() / rayon::current_num_threads().max(1)).max(MIN_CHUNK);
        snapshot
            .as_slice()
            .par_chunks(chunk)
            .map(|entries| {
                let mut top = TopK::new(k);
                for (id, vector) in entries {
                    if let Some(record) = self.admit(id, filter) {
                        top.push(Candidate {
                            score: compute_score(query, vector, metric),
                            id,
                            record,
                        });
                    }
                }
                top
            })
            .reduce(|| TopK::new(k), TopK::merge)
            .into_sorted_vec()
    }
}
