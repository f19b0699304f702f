//! Spotify bridge
//!
//! Single-binary service that:
//! 1. Redirects the user through the Spotify authorization flow
//! 2. Exchanges the callback code for an access/refresh token pair
//! 3. Serves listening data and playback control through that credential,
//!    refreshing it behind a process-wide single-flight gate

mod config;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spotify_auth::TokenExchanger;
use spotify_session::{ResourceGateway, SessionManager};

use crate::config::Config;
use crate::routes::{AppState, build_router};

/// Ceiling on graceful shutdown: in-flight requests get this long to drain
/// after the signal before the process exits anyway.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting spotify-bridge");

    // Install the Prometheus recorder before any metrics are emitted
    let prometheus = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        accounts_url = %config.spotify.accounts_url,
        api_url = %config.spotify.api_url,
        redirect_uri = %config.spotify.redirect_uri,
        "configuration loaded"
    );

    // One long-lived HTTP client with the configured timeout, shared by the
    // token exchanger and the resource gateway
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.server.request_timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let client_secret = config
        .spotify
        .client_secret
        .clone()
        .context("client secret missing")?;

    let exchanger = TokenExchanger::new(
        client.clone(),
        &config.spotify.accounts_url,
        config.spotify.client_id.clone(),
        client_secret,
        config.spotify.redirect_uri.clone(),
    );
    let session = Arc::new(SessionManager::new(exchanger));
    let gateway = Arc::new(ResourceGateway::new(
        client,
        &config.spotify.api_url,
        session.clone(),
    ));

    let state = AppState {
        session,
        gateway,
        client_id: config.spotify.client_id.clone(),
        redirect_uri: config.spotify.redirect_uri.clone(),
        accounts_url: config.spotify.accounts_url.clone(),
        pending_state: Arc::new(tokio::sync::RwLock::new(None)),
        started_at: Instant::now(),
        requests_total: Arc::new(AtomicU64::new(0)),
        prometheus,
    };

    let app = build_router(state, config.server.max_connections);

    let listener = TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.server.listen_addr))?;
    info!(addr = %config.server.listen_addr, "accepting requests");

    // Graceful shutdown: on SIGTERM/SIGINT stop accepting, drain in-flight
    // requests, and enforce DRAIN_TIMEOUT from the moment the signal fires
    // so a slow upstream cannot hold the process open.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    info!("shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
