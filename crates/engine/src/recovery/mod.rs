//! Startup recovery across the two stores
//!
//! Runs once per open, after both logs have been replayed and before the
//! database accepts requests:
//!
//! - an embedding with no metadata is a torn insert or delete; it is
//!   removed from the embedding store
//! - metadata with no embedding is INCOMPLETE; it is reported and kept,
//!   and stays out of search until repaired

use std::cmp::Ordering;
use svdb_core::{RecordId, SvdbResult};
use svdb_storage::{EmbeddingStore, LogReplay, MetadataStore};
use tracing::{info, warn};

/// What recovery found and did on open
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Embeddings without metadata, removed
    pub torn_removed: Vec<RecordId>,
    /// Metadata without an embedding, kept as INCOMPLETE
    pub incomplete: Vec<RecordId>,
    /// Log entries replayed from `embeddings.log`
    pub embedding_entries: u64,
    /// Log entries replayed from `metadata.log`
    pub metadata_entries: u64,
    /// Bytes cut from torn log tails, summed over both logs
    pub truncated_bytes: u64,
}

impl RecoveryReport {
    /// True if nothing needed repair
    pub fn is_clean(&self) -> bool {
        self.torn_removed.is_empty() && self.incomplete.is_empty() && self.truncated_bytes == 0
    }
}

/// Reconcile the stores after replay
pub(crate) fn recover(
    embeddings: &EmbeddingStore,
    metadata: &MetadataStore,
    embedding_replay: LogReplay,
    metadata_replay: LogReplay,
) -> SvdbResult<RecoveryReport> {
    let (orphans, incomplete) = diff_ids(&embeddings.ids(), &metadata.ids());

    for id in &orphans {
        warn!(target: "svdb::recovery", id = %id, "Removing embedding without metadata (torn write)");
        let _ = embeddings.delete(id)?;
    }
    if !incomplete.is_empty() {
        warn!(
            target: "svdb::recovery",
            count = incomplete.len(),
            "Records with metadata but no embedding are INCOMPLETE and excluded from search"
        );
    }

    let report = RecoveryReport {
        torn_removed: orphans,
        incomplete,
        embedding_entries: embedding_replay.frames,
        metadata_entries: metadata_replay.frames,
        truncated_bytes: embedding_replay.truncated_bytes + metadata_replay.truncated_bytes,
    };

    info!(
        target: "svdb::recovery",
        embedding_entries = report.embedding_entries,
        metadata_entries = report.metadata_entries,
        torn_removed = report.torn_removed.len(),
        incomplete = report.incomplete.len(),
        truncated_bytes = report.truncated_bytes,
        "Recovery complete"
    );
    Ok(report)
}

/// Split two sorted id lists into (only in `left`, only in `right`)
fn diff_ids(left: &[RecordId], right: &[RecordId]) -> (Vec<RecordId>, Vec<RecordId>) {
    let mut only_left = Vec::new();
    let mut only_right = Vec::new();
    let (mut i, mut j) = (0, 0);

    while i < left.len() && j < right.len() {
        match left[i].cmp(&right[j]) {
            Ordering::Less => {
                only_left.push(left[i].clone());
                i += 1;
            }
            Ordering::Greater => {
                only_right.push(right[j].clone());
                j += 1;
            }
            Ordering::Equal => {
                i += 1;
                j += 1;
            }
        }
    }
    only_left.extend_from_slice(&left[i..]);
    only_right.extend_from_slice(&right[j..]);
    (only_left, only_right)
}
