//! Bounded top-k selection
//!
//! A min-heap of at most k candidates: the root is the worst kept
//! candidate and is evicted when a better one arrives. "Better" means a
//! higher score, then a smaller identifier, so the result is a total order
//! and identical however the input is split or ordered.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use svdb_core::{Record, RecordId};

/// A scored identifier borrowed from a snapshot, with the metadata record
/// it was admitted on. Ordering ignores the record.
#[derive(Debug, Clone)]
pub(crate) struct Candidate<'a> {
    pub(crate) score: f32,
    pub(crate) id: &'a RecordId,
    pub(crate) record: Arc<Record>,
}

impl PartialEq for Candidate<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate<'_> {}

impl PartialOrd for Candidate<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate<'_> {
    /// Greater is better
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.id.cmp(self.id))
    }
}

/// Keeps the k best candidates seen so far
pub(crate) struct TopK<'a> {
    k: usize,
    heap: BinaryHeap<Reverse<Candidate<'a>>>,
}

impl<'a> TopK<'a> {
    pub(crate) fn new(k: usize) -> Self {
        TopK {
            k,
            heap: BinaryHeap::with_capacity(k.min(1024) + 1),
        }
    }

    pub(crate) fn push(&mut self, candidate: Candidate<'a>) {
        if self.heap.len() < self.k {
            self.heap.push(Reverse(candidate));
            return;
        }
        if let Some(Reverse(worst)) = self.heap.peek() {
            if candidate > *worst {
                self.heap.pop();
                self.heap.push(Reverse(candidate));
            }
        }
    }

    /// Fold another partial result into this one
    pub(crate) fn merge(mut self, other: TopK<'a>) -> Self {
        for Reverse(candidate) in other.heap {
            self.push(candidate);
        }
        self
    }

    /// Kept candidates, best first
    pub(crate) fn into_sorted_vec(self) -> Vec<Candidate<'a>> {
        let mut out: Vec<_> = self.heap.into_iter().map(|Reverse(c)| c).collect();
        out.sort_by(|a, b| b.cmp(a));
        out
    }
}
