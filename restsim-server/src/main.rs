//! restsim-server — fake REST API backed by generated SQL.
//!
//! Reads config from env vars (and `.env`):
//!   OPENAI_API_KEY      — enables live simulations (optional)
//!   OPENAI_MODEL        — default: gpt-4o-mini
//!   RESTSIM_BIND_ADDR   — listen address (default: 0.0.0.0:3000)
//!   RESTSIM_GATEWAY     — `replay` to serve canned completions from RESTSIM_REPLAY_FILE

use std::sync::Arc;

use anyhow::Context;
use restsim_core::{build_gateway, SimulatorConfig, StateStore};
use restsim_server::router::build_router;
use restsim_server::AppState;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,restsim_server=debug,restsim_core=debug".into()),
        )
        .init();

    let config = SimulatorConfig::from_env();
    tracing::debug!(?config, "configuration loaded");

    let gateway = build_gateway(&config);
    let state = Arc::new(
        StateStore::new(config.initial_context())
            .await
            .context("failed to open in-memory store")?,
    );
    let app = build_router(AppState::new(state, gateway, config.has_api_key()));

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;
    tracing::info!(
        "restsim-server listening on {} (OpenAI key: {})",
        config.bind_addr,
        if config.has_api_key() { "set" } else { "missing" }
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
