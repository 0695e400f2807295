//! Windlass service entry point.
//!
//! Initialises tracing, loads configuration from `WINDLASS_*` environment
//! variables, and serves the event intake until Ctrl-C.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use windlass::intake::{self, AppState};
use windlass::settings::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("windlass starting");

    let settings = Settings::from_env()?;
    tracing::info!(
        listen_addr = %settings.listen_addr,
        config_api = %settings.config_api_base,
        intake_endpoint = settings.intake_endpoint.as_deref().unwrap_or("<disabled>"),
        bootstrap_delay_secs = settings.bootstrap_delay_secs,
        bootstrap_max_attempts = settings.bootstrap_max_attempts,
        "configuration loaded",
    );

    let listen_addr = settings.listen_addr.clone();
    let router = intake::router(AppState::new(settings));

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    tracing::info!("event intake ready — http://{listen_addr}/events");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("windlass shut down");
    Ok(())
}

/// Wait for SIGINT (Ctrl-C) for graceful shutdown.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install Ctrl-C handler");
        return;
    }
    tracing::info!("received shutdown signal");
}
