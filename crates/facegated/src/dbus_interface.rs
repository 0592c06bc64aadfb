use crate::engine::{EngineError, EngineHandle};
use facegate_core::{Decision, VerifyError};
use zbus::interface;

/// D-Bus interface for the FaceGate terminal authentication daemon.
///
/// Bus name: org.facegate.FaceGate1
/// Object path: /org/facegate/FaceGate1
pub struct FaceGateService {
    engine: EngineHandle,
    threshold: f32,
    db_path: String,
}

impl FaceGateService {
    pub fn new(engine: EngineHandle, threshold: f32, db_path: String) -> Self {
        Self {
            engine,
            threshold,
            db_path,
        }
    }
}

#[interface(name = "org.facegate.FaceGate1")]
impl FaceGateService {
    /// Enroll an identity from a photo. Re-enrolling an existing username
    /// overwrites the prior template.
    async fn enroll(
        &self,
        username: &str,
        account_number: &str,
        pin: &str,
        photo: Vec<u8>,
    ) -> zbus::fdo::Result<()> {
        tracing::info!(username, photo_len = photo.len(), "enroll requested");

        self.engine
            .enroll(
                username.to_string(),
                account_number.to_string(),
                pin.to_string(),
                photo,
            )
            .await
            .map_err(map_engine_error)
    }

    /// Verify a PIN + photo against the enrolled template. Returns true
    /// only when both factors pass; the caller is never told which factor
    /// failed.
    async fn verify(&self, username: &str, pin: &str, photo: Vec<u8>) -> zbus::fdo::Result<bool> {
        tracing::info!(username, photo_len = photo.len(), "verify requested");

        let decision = self
            .engine
            .verify(username.to_string(), pin.to_string(), photo)
            .await
            .map_err(map_engine_error)?;

        Ok(decision == Decision::Granted)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "similarity_threshold": self.threshold,
            "db_path": self.db_path,
        })
        .to_string())
    }
}

/// Map engine errors onto D-Bus error categories. Undecodable photos are
/// the caller's fault; everything else is internal.
fn map_engine_error(err: EngineError) -> zbus::fdo::Error {
    match &err {
        EngineError::Enroll(facegate_core::EnrollError::ImageDecode(_))
        | EngineError::Verify(VerifyError::ImageDecode(_)) => {
            zbus::fdo::Error::InvalidArgs(err.to_string())
        }
        _ => zbus::fdo::Error::Failed(err.to_string()),
    }
}
