use anyhow::{Context, Result};
use imgdrop_server::{
    config::AppConfig,
    routes::{AppState, create_router},
    storage::LocalFileStorage,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imgdrop_server=info,tower_http=debug".into()),
        )
        .init();

    let config = AppConfig::from_env()?;

    let storage = LocalFileStorage::new(config.upload_dir.clone()).with_context(|| {
        format!(
            "Failed to initialize upload directory {}",
            config.upload_dir.display()
        )
    })?;

    let addr = config.socket_addr()?;
    let upload_dir = config.upload_dir.clone();
    let app = create_router(AppState::new(config, Arc::new(storage)));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, upload_dir = %upload_dir.display(), "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
