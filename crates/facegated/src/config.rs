use facegate_core::DEFAULT_SIMILARITY_THRESHOLD;
use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Directory containing the ONNX embedding model.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Cosine similarity threshold for a positive match.
    pub similarity_threshold: f32,
}

const EMBEDDING_MODEL_FILE: &str = "facenet.onnx";

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("FACEGATE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/usr/share/facegate/models"));

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facegate");

        let db_path = std::env::var("FACEGATE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("identities.db"));

        Self {
            model_dir,
            db_path,
            similarity_threshold: env_f32(
                "FACEGATE_SIMILARITY_THRESHOLD",
                DEFAULT_SIMILARITY_THRESHOLD,
            ),
        }
    }

    /// Path to the embedding model file.
    pub fn model_path(&self) -> String {
        self.model_dir
            .join(EMBEDDING_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
