//! Embedding model boundary
//!
//! The database stores and searches vectors but never produces them.
//! An application layer turns content into vectors through this trait
//! before handing them to the database.

use crate::error::SvdbResult;

/// Turns content into a fixed-length vector
///
/// Implementations must return vectors of a single, fixed length (the
/// store dimension) for every input.
pub trait Embedder: Send + Sync {
    /// Embed a piece of text
    fn embed(&self, content: &str) -> SvdbResult<Vec<f32>>;

    /// Embed several pieces of text
    ///
    /// The default calls [`embed`](Embedder::embed) once per item.
    fn embed_batch(&self, contents: &[&str]) -> SvdbResult<Vec<Vec<f32>>> {
        contents.iter().map(|c| self.embed(c)).collect()
    }

    /// Length of the vectors this embedder produces
    fn dimension(&self) -> usize;
}
