//! Similarity decisioning over embedding pairs.

use crate::types::Embedding;
use thiserror::Error;

/// Cosine similarity above which two embeddings are considered the same
/// identity. A policy constant, not derived from data — recalibrate here
/// (or via `FACEGATE_SIMILARITY_THRESHOLD`) without touching the algorithm.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.9;

#[derive(Error, Debug)]
pub enum MatchError {
    /// Stored and candidate embeddings differ in length. With a fixed model
    /// this never happens; if it does, it is a configuration error, not a
    /// user-facing denial.
    #[error("embedding dimension mismatch: stored {stored}, candidate {candidate}")]
    DimensionMismatch { stored: usize, candidate: usize },
}

/// Renders a binary match decision from cosine similarity.
#[derive(Debug, Clone, Copy)]
pub struct CosineMatcher {
    threshold: f32,
}

impl CosineMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Match iff cosine similarity is strictly greater than the threshold.
    /// A score exactly at the threshold is a non-match.
    pub fn matches(&self, stored: &Embedding, candidate: &Embedding) -> Result<bool, MatchError> {
        if stored.dim() != candidate.dim() {
            return Err(MatchError::DimensionMismatch {
                stored: stored.dim(),
                candidate: candidate.dim(),
            });
        }
        Ok(stored.similarity(candidate) > self.threshold)
    }
}

impl Default for CosineMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}
