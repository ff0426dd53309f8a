//! HTTP server startup
//!
//! Binds the listener, builds the router over file storage and serves until
//! Ctrl-C (or SIGTERM on Unix) is received.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::{config::Config, routes, state::AppState, storage::FileStorage};

pub async fn run_server(config: Config) -> Result<()> {
    info!("Starting NuGet feed server");

    let data_dir = config.storage.data_dir.clone();
    tokio::fs::create_dir_all(&data_dir)
        .await
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
    let data_dir = tokio::fs::canonicalize(&data_dir)
        .await
        .with_context(|| format!("Failed to resolve data directory {}", data_dir.display()))?;
    info!(data_dir = %data_dir.display(), "Using data directory");

    let host = config.server.host.clone();
    let port = config.server.port;
    let state = AppState::from_config(config, Arc::new(FileStorage::new(&data_dir)))
        .context("Invalid server configuration")?;
    let base_url = state.base_url.clone();
    let app = routes::create_router(Arc::new(state));

    let listener = TcpListener::bind((host.as_str(), port)).await.map_err(|e| {
        error!(host = %host, port = %port, error = %e, "Failed to bind to address");
        anyhow::anyhow!("Failed to bind to {host}:{port}: {e}")
    })?;
    let addr: SocketAddr = listener
        .local_addr()
        .context("Failed to read listener address")?;

    println!("✅ NuGet feed is running on http://{addr}");
    println!("📦 Service index: {base_url}index.json");
    println!("📂 Data directory: {}", data_dir.display());

    info!(addr = %addr, base_url = %base_url, "Server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!(error = %e, "Server error");
            anyhow::anyhow!("Server error: {e}")
        })?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
