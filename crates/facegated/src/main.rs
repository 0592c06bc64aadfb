use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facegated starting");

    let config = config::Config::from_env();

    let store = facegate_store::SqliteTemplateStore::open(&config.db_path)
        .with_context(|| format!("opening template store at {}", config.db_path.display()))?;

    // Fail fast: a missing model must refuse startup, not fail on the
    // first enrollment.
    let engine = engine::spawn_engine(
        &config.model_path(),
        store,
        config.similarity_threshold,
    )
    .context("starting biometric engine")?;

    let service = dbus_interface::FaceGateService::new(
        engine,
        config.similarity_threshold,
        config.db_path.display().to_string(),
    );

    let _conn = zbus::connection::Builder::system()?
        .name("org.facegate.FaceGate1")?
        .serve_at("/org/facegate/FaceGate1", service)?
        .build()
        .await
        .context("registering on the system bus")?;

    tracing::info!("facegated ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("facegated shutting down");

    Ok(())
}
