use serde::{Deserialize, Serialize};

/// Face embedding vector (128-dimensional for the bundled FaceNet model).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Number of dimensions in this embedding.
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar.
    /// Always processes all dimensions; no early exit.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }
}

/// An enrolled identity: credentials plus biometric template.
///
/// The PIN is stored verbatim and compared by exact string equality.
/// Hardening (hash + salt) is tracked as an open design question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Unique key, immutable once created.
    pub username: String,
    /// Opaque; stored verbatim, never validated here.
    pub account_number: String,
    pub pin: String,
    pub embedding: Embedding,
    /// RFC 3339 timestamp of enrollment.
    pub created_at: String,
}
