//! Serve command implementation

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use levelup::config::Config;
use levelup::server::{ApiState, HttpServer};
use levelup::service::GamificationService;

/// CLI flags that override config.toml values
#[derive(Debug, Default)]
pub struct ServeOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Run the HTTP API until Ctrl-C
pub async fn serve_command(mut config: Config, overrides: ServeOverrides) -> Result<()> {
    if let Some(host) = overrides.host {
        config.server.host = host;
    }
    if let Some(port) = overrides.port {
        config.server.port = port;
    }

    let catalog = config.load_catalog()?;
    let store = config.open_store()?;
    info!(
        "[levelup:serve] {} achievements, storage: {:?}",
        catalog.len(),
        config.storage.backend
    );

    let service = Arc::new(GamificationService::new(store, Arc::new(catalog)));
    let state = ApiState::new(service, config.leaderboard.clone());
    let server = HttpServer::bind(&config.server, state)
        .with_context(|| format!("Failed to start server on {}", config.server.bind_addr()))?;
    let shutdown = server.shutdown_handle();

    let worker = tokio::task::spawn_blocking(move || server.run());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("[levelup:serve] Shutting down");
    shutdown.shutdown();

    worker.await.context("Server thread panicked")?;
    Ok(())
}
