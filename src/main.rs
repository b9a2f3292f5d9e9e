//! Copilot Gateway - OpenAI-compatible chat completions over Copilot sessions
//!
//! This is the main entry point for the gateway server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tracing::{info, warn};

use copilot_gateway::{routes, server, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "copilot_gateway=info,tower_http=info".into()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting Copilot Gateway");

    let config = Config::from_env()?;
    info!(
        default_credential = config.default_credential.is_some(),
        cli_path = %config.cli_path,
        "Configuration loaded successfully"
    );
    if config.default_credential.is_none() {
        info!("No GH_TOKEN set; every request must supply its own credential");
    }

    if config.metrics_enabled {
        routes::metrics::init_metrics();
        info!("Metrics initialized");
    }

    let state = Arc::new(AppState::new(config.clone()).await?);
    info!("Application state initialized");

    let app = routes::create_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    server::serve(listener, app, shutdown_signal(), config.drain_timeout).await?;

    // Stopping clients must never hold up process exit
    match tokio::time::timeout(config.shutdown_timeout, state.pool.shutdown_all()).await {
        Ok(()) => info!("Backend clients stopped"),
        Err(_) => warn!(
            timeout_secs = config.shutdown_timeout.as_secs(),
            "Timed out stopping backend clients"
        ),
    }

    info!("Copilot Gateway shutdown complete");
    Ok(())
}

/// Handle graceful shutdown signals
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating shutdown");
        }
    }
}
