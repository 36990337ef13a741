//! Per-identifier write locks
//!
//! Writes to the same identifier are serialized; writes to different
//! identifiers never contend here. Entries are created on demand and
//! dropped again once no writer holds or waits on them, so the table only
//! grows with the number of in-flight writes.

use dashmap::DashMap;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use std::sync::Arc;
use svdb_core::RecordId;

/// Lock table keyed by record identifier
#[derive(Default)]
pub(crate) struct IdLockTable {
    locks: DashMap<RecordId, Arc<Mutex<()>>>,
}

/// Held while a write to one identifier is in progress
pub(crate) struct IdGuard<'a> {
    table: &'a IdLockTable,
    id: RecordId,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl IdLockTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Block until `id` is free, then hold it until the guard drops
    pub(crate) fn lock(&self, id: &RecordId) -> IdGuard<'_> {
        // The shard lock is released at the end of this statement, before
        // we block on the per-id mutex.
        let mutex = Arc::clone(
            &self
                .locks
                .entry(id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        );
        let guard = mutex.lock_arc();
        IdGuard {
            table: self,
            id: id.clone(),
            guard: Some(guard),
        }
    }

    /// Number of identifiers currently held or awaited
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}

impl Drop for IdGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // Only the table's own reference left: nobody holds or waits
        self.table
            .locks
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
