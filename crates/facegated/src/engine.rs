use facegate_core::extractor::ExtractorError;
use facegate_core::{
    AuthService, CosineMatcher, Decision, EnrollError, OnnxExtractor, TemplateStore, VerifyError,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("extractor error: {0}")]
    Extractor(#[from] ExtractorError),
    #[error("enroll failed: {0}")]
    Enroll(#[from] EnrollError),
    #[error("verify failed: {0}")]
    Verify(#[from] VerifyError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Enroll {
        username: String,
        account_number: String,
        pin: String,
        photo: Vec<u8>,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Verify {
        username: String,
        pin: String,
        photo: Vec<u8>,
        reply: oneshot::Sender<Result<Decision, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Request enrollment: decode the photo, run the pipeline, persist the
    /// template.
    pub async fn enroll(
        &self,
        username: String,
        account_number: String,
        pin: String,
        photo: Vec<u8>,
    ) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Enroll {
                username,
                account_number,
                pin,
                photo,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Request verification: PIN gate, then pipeline + matcher.
    pub async fn verify(
        &self,
        username: String,
        pin: String,
        photo: Vec<u8>,
    ) -> Result<Decision, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Verify {
                username,
                pin,
                photo,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Loads the ONNX model synchronously before any request is accepted —
/// a missing or incompatible model refuses startup rather than failing on
/// first use. The thread owns the inference session and the store handle,
/// so concurrent D-Bus requests are serialized through the channel and the
/// session is never shared mutably.
pub fn spawn_engine<S>(
    model_path: &str,
    store: S,
    threshold: f32,
) -> Result<EngineHandle, EngineError>
where
    S: TemplateStore + 'static,
{
    let extractor = OnnxExtractor::load(model_path)?;
    tracing::info!(path = model_path, threshold, "embedding model loaded");

    let mut service = AuthService::new(store, extractor, CosineMatcher::new(threshold));

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Enroll {
                        username,
                        account_number,
                        pin,
                        photo,
                        reply,
                    } => {
                        let result = service
                            .enroll(&username, &account_number, &pin, &photo)
                            .map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Verify {
                        username,
                        pin,
                        photo,
                        reply,
                    } => {
                        let result = service
                            .verify(&username, &pin, &photo)
                            .map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    Ok(EngineHandle { tx })
}
