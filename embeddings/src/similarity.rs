//! Vector math for shop search.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::{EmbeddingError, Result};

fn check_dimensions(expected: &[f32], actual: &[f32]) -> Result<()> {
    if expected.len() == actual.len() {
        Ok(())
    } else {
        Err(EmbeddingError::DimensionMismatch {
            expected: expected.len(),
            actual: actual.len(),
        })
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn magnitude(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Cosine of the angle between `a` and `b`, in [-1, 1]. A zero vector is
/// orthogonal to everything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dimensions(a, b)?;
    let norms = magnitude(a) * magnitude(b);
    if norms == 0.0 {
        return Ok(0.0);
    }
    Ok((dot(a, b) / norms).clamp(-1.0, 1.0))
}

/// One scored match from an index search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub id: String,

    /// Cosine similarity in [-1, 1].
    pub score: f32,

    /// Whatever was stored alongside the vector.
    pub metadata: Option<serde_json::Value>,
}

impl SimilarityResult {
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Score every candidate against `query` and keep the best `k` at or above
/// `min_score`, best first. Ties keep candidate order.
pub fn find_top_k<'a, I>(
    query: &[f32],
    candidates: I,
    k: usize,
    min_score: f32,
) -> Result<Vec<SimilarityResult>>
where
    I: IntoIterator<Item = (&'a str, &'a [f32])>,
{
    let mut scored = Vec::new();
    for (id, embedding) in candidates {
        let score = cosine_similarity(query, embedding)?;
        if score >= min_score {
            scored.push((id, score));
        }
    }

    // Stable sort, so equal scores stay in candidate order.
    scored.sort_by_key(|(_, score)| Reverse(OrderedFloat(*score)));
    scored.truncate(k);
    Ok(scored
        .into_iter()
        .map(|(id, score)| SimilarityResult::new(id, score))
        .collect())
}

/// Scale `embedding` to unit length in place. Zero vectors are left alone.
pub fn normalize(embedding: &mut [f32]) {
    let length = magnitude(embedding);
    if length > 0.0 {
        embedding.iter_mut().for_each(|x| *x /= length);
    }
}
