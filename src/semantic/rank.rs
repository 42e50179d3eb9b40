//! Cosine similarity ranking over an in-memory candidate set.
//!
//! Every candidate is scored independently into `Result<f32, SkipReason>`;
//! a bad vector drops that one candidate and never the batch.

use serde::Serialize;

use crate::notes::Note;

/// Why a candidate did not receive a score.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum SkipReason {
    #[error("no embedding")]
    Missing,

    #[error("empty vector")]
    Empty,

    #[error("non-finite value at index {0}")]
    NonFinite(usize),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("zero-norm vector")]
    ZeroNorm,

    #[error("non-finite score")]
    NonFiniteScore,
}

/// A note with its similarity to the query, in [-1, 1].
#[derive(Debug, Clone, Serialize)]
pub struct ScoredNote {
    pub score: f32,
    pub note: Note,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityRanker;

impl SimilarityRanker {
    pub fn new() -> Self {
        Self
    }

    /// Score one candidate against the query vector.
    pub fn score(&self, query: &[f32], note: &Note) -> Result<f32, SkipReason> {
        let target = note.embedding.as_deref().ok_or(SkipReason::Missing)?;

        if target.is_empty() {
            return Err(SkipReason::Empty);
        }
        if let Some(idx) = target.iter().position(|v| !v.is_finite()) {
            return Err(SkipReason::NonFinite(idx));
        }
        if target.len() != query.len() {
            return Err(SkipReason::DimensionMismatch {
                expected: query.len(),
                got: target.len(),
            });
        }

        cosine_similarity(query, target)
    }

    /// Rank candidates by descending score. Ties keep input order.
    pub fn rank<'a, I>(&self, query: &[f32], candidates: I) -> Vec<ScoredNote>
    where
        I: IntoIterator<Item = &'a Note>,
    {
        let mut results: Vec<ScoredNote> = candidates
            .into_iter()
            .filter_map(|note| match self.score(query, note) {
                Ok(score) => Some(ScoredNote {
                    score,
                    note: note.clone(),
                }),
                Err(reason) => {
                    log::warn!("Skipping note={} title={:?}: {}", note.id, note.title, reason);
                    None
                }
            })
            .collect();

        sort_scored(&mut results);
        results
    }
}

/// Stable descending sort by score.
pub fn sort_scored(results: &mut [ScoredNote]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Cosine similarity accumulated in f64.
fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, SkipReason> {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let x = f64::from(x);
        let y = f64::from(y);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        return Err(SkipReason::ZeroNorm);
    }

    let score = dot / denom;
    if !score.is_finite() {
        return Err(SkipReason::NonFiniteScore);
    }

    Ok(score.clamp(-1.0, 1.0) as f32)
}
