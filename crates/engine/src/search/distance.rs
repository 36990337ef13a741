//! Distance functions for similarity scoring.
//!
//! All scores are normalized to "higher = more similar". Distance metrics
//! (Euclidean, Manhattan) are negated rather than transformed, so the
//! native distance is recoverable with [`Metric::raw_value`].
//! No implicit normalization of vectors: they are used as-is.

use svdb_core::Metric;

/// Compute the normalized score of `b` against query `a`
pub fn compute_score(a: &[f32], b: &[f32], metric: Metric) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Dimension mismatch in score computation");

    let score = match metric {
        Metric::Cosine => cosine_similarity(a, b),
        Metric::Euclidean => -euclidean_distance(a, b),
        Metric::DotProduct => dot_product(a, b),
        Metric::Manhattan => -manhattan_distance(a, b),
    };
    // -0.0 and 0.0 must tie
    if score == 0.0 {
        0.0
    } else {
        score
    }
}

/// Cosine similarity: dot(a,b) / (||a|| * ||b||)
///
/// Range: [-1, 1]. Returns 0.0 if either vector has zero norm.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot = dot_f64(a, b);
    let norm_a = dot_f64(a, a).sqrt();
    let norm_b = dot_f64(b, b).sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0) as f32
    }
}

// Sums are accumulated in f64: squares of finite f32 components cannot
// overflow it at any supported dimension, so no score is ever NaN.
fn dot_f64(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| x as f64 * y as f64)
        .sum()
}

/// Dot product (inner product). Saturates to an infinity when the true
/// value is beyond the f32 range.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    dot_f64(a, b) as f32
}

/// Euclidean (L2) distance
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt() as f32
}

/// Manhattan (L1) distance
pub fn manhattan_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x as f64 - y as f64).abs())
        .sum::<f64>() as f32
}
