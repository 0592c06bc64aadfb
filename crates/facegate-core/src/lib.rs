//! facegate-core — Biometric second-factor engine.
//!
//! Deterministic preprocessing (enhance → restore → segment → morphology),
//! fixed-length face embeddings via ONNX Runtime, and cosine-similarity
//! matching behind a PIN gate.

pub mod auth;
pub mod extractor;
pub mod matcher;
pub mod preprocess;
pub mod store;
pub mod types;

pub use auth::{AuthService, Decision, EnrollError, VerifyError};
pub use extractor::{EmbeddingExtractor, OnnxExtractor, EMBEDDING_DIM};
pub use matcher::{CosineMatcher, DEFAULT_SIMILARITY_THRESHOLD};
pub use store::{MemoryTemplateStore, StoreError, TemplateStore};
pub use types::{Embedding, IdentityRecord};
