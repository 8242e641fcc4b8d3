use anyhow::Result;
use bookwright_assistant::{AssistantConfig, OllamaClient};
use bookwright_story::{router, AppState, Session, StudioConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("BookWright Studio Service v{}", env!("CARGO_PKG_VERSION"));

    let config = StudioConfig::from_env();

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let session = Session::open(&config.db_path)?;
    info!("Database initialized at: {}", config.db_path.display());

    let assistant_config = AssistantConfig::from_env();
    let base_url = assistant_config.base_url.clone();
    let assistant = OllamaClient::new(assistant_config)?;
    info!("Assistant: {} (model: {})", base_url, assistant.model());

    let state = AppState::new(session, Arc::new(assistant), config.export_dir.clone());
    let shutdown = state.shutdown.clone();
    let app = router(state);

    info!("Starting HTTP server on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown.notified() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
            info!("Shutting down");
        })
        .await?;

    Ok(())
}
