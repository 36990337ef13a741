//! Similarity metrics
//!
//! All metrics are normalized to "higher = more similar". Similarity
//! metrics (cosine, dot product) are used as-is; distance metrics
//! (Euclidean, Manhattan) are negated. The actual arithmetic lives in the
//! engine's search module.

use crate::error::SvdbError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Similarity metric, selected by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Metric {
    /// Cosine similarity: dot(a,b) / (||a|| * ||b||)
    /// Range: [-1, 1]; 0 when either vector has zero norm
    #[default]
    Cosine,

    /// Euclidean (L2) distance, scored as `-distance`
    /// Range: (-inf, 0]
    Euclidean,

    /// Dot product (raw value)
    /// Range: unbounded
    DotProduct,

    /// Manhattan (L1) distance, scored as `-distance`
    /// Range: (-inf, 0]
    Manhattan,
}

impl Metric {
    /// All supported metrics
    pub const ALL: [Metric; 4] = [
        Metric::Cosine,
        Metric::Euclidean,
        Metric::DotProduct,
        Metric::Manhattan,
    ];

    /// Canonical lowercase name
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::Euclidean => "euclidean",
            Metric::DotProduct => "dot_product",
            Metric::Manhattan => "manhattan",
        }
    }

    /// Parse from string (case-insensitive, common aliases accepted)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cosine" => Some(Metric::Cosine),
            "euclidean" | "l2" => Some(Metric::Euclidean),
            "dot_product" | "dot" | "inner_product" => Some(Metric::DotProduct),
            "manhattan" | "l1" => Some(Metric::Manhattan),
            _ => None,
        }
    }

    /// True if the underlying measure is a similarity (higher is better)
    /// rather than a distance (lower is better)
    pub fn is_similarity(&self) -> bool {
        matches!(self, Metric::Cosine | Metric::DotProduct)
    }

    /// Convert a normalized score back to the metric's native value
    ///
    /// For distance metrics this undoes the negation, e.g. an L2 score of
    /// `-2.0` is a distance of `2.0`.
    pub fn raw_value(&self, score: f32) -> f32 {
        if self.is_similarity() {
            score
        } else {
            -score
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = SvdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::parse(s).ok_or_else(|| {
            SvdbError::invalid_argument(format!(
                "unknown metric '{}' (expected cosine, euclidean, dot_product or manhattan)",
                s
            ))
        })
    }
}
