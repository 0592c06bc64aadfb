//! Enrollment and verification flows.
//!
//! Each call is an independent, synchronous unit of work: decode → preprocess
//! → extract, then either persist the template (enroll) or gate on PIN and
//! similarity (verify). Decoded image buffers live only for the duration of
//! the call and are never persisted.

use crate::extractor::{EmbeddingExtractor, ExtractorError};
use crate::matcher::{CosineMatcher, MatchError};
use crate::preprocess::preprocess;
use crate::store::{StoreError, TemplateStore};
use crate::types::IdentityRecord;
use thiserror::Error;

/// Terminal outcome of a verification attempt. No partial credit and no
/// retry within an attempt; a new attempt is a fresh invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Granted,
    Denied,
}

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("photo could not be decoded: {0}")]
    ImageDecode(#[from] image::ImageError),
    #[error(transparent)]
    Extractor(#[from] ExtractorError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("photo could not be decoded: {0}")]
    ImageDecode(#[from] image::ImageError),
    #[error(transparent)]
    Extractor(#[from] ExtractorError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Match(#[from] MatchError),
}

/// Orchestrates the biometric pipeline against an injected store and
/// extractor.
pub struct AuthService<S, E> {
    store: S,
    extractor: E,
    matcher: CosineMatcher,
}

impl<S: TemplateStore, E: EmbeddingExtractor> AuthService<S, E> {
    pub fn new(store: S, extractor: E, matcher: CosineMatcher) -> Self {
        Self {
            store,
            extractor,
            matcher,
        }
    }

    /// Register an identity: decode the photo, run the pipeline, persist
    /// the record keyed by username.
    ///
    /// Enrolling an existing username re-enrolls it — the prior record is
    /// overwritten, last write wins.
    pub fn enroll(
        &mut self,
        username: &str,
        account_number: &str,
        pin: &str,
        photo_bytes: &[u8],
    ) -> Result<(), EnrollError> {
        let photo = image::load_from_memory(photo_bytes)?.to_rgb8();
        let prepared = preprocess(&photo);
        let embedding = self.extractor.extract(&prepared)?;

        let record = IdentityRecord {
            username: username.to_string(),
            account_number: account_number.to_string(),
            pin: pin.to_string(),
            embedding,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.store.put(record)?;

        tracing::info!(username, "identity enrolled");
        Ok(())
    }

    /// Check a presented PIN + photo against the enrolled template.
    ///
    /// Denials are generic by design: the caller learns only `Denied`,
    /// never which factor failed and never a similarity score. The failed
    /// factor is logged server-side only.
    pub fn verify(
        &mut self,
        username: &str,
        pin: &str,
        photo_bytes: &[u8],
    ) -> Result<Decision, VerifyError> {
        let Some(record) = self.store.get(username)? else {
            tracing::info!(username, "verify denied: unknown user");
            return Ok(Decision::Denied);
        };

        if record.pin != pin {
            tracing::info!(username, "verify denied: credential mismatch");
            return Ok(Decision::Denied);
        }

        let photo = image::load_from_memory(photo_bytes)?.to_rgb8();
        let prepared = preprocess(&photo);
        let candidate = self.extractor.extract(&prepared)?;

        if self.matcher.matches(&record.embedding, &candidate)? {
            tracing::info!(username, "verify granted");
            Ok(Decision::Granted)
        } else {
            tracing::info!(username, "verify denied: low similarity");
            Ok(Decision::Denied)
        }
    }
}
