//! # Hermes Routing Server
//!
//! Standalone server binary for the routing core. Loads configuration from
//! the environment (plus an optional `hermes.toml`), connects the
//! configured backends, and runs until Ctrl+C or SIGTERM.
//!
//! ```bash
//! # In-memory backends (local smoke runs)
//! cargo run --bin hermes-server
//!
//! # Durable backends
//! HERMES__QUEUE__BACKEND=pgmq \
//! HERMES__QUEUE__DATABASE_URL=postgresql://localhost/hermes \
//! HERMES__STORAGE__BACKEND=postgres \
//! HERMES__STORAGE__DATABASE_URL=postgresql://localhost/hermes \
//! cargo run --bin hermes-server
//! ```

use std::time::Duration;

use tokio::signal;
use tracing::{error, info};

use hermes_routing::{CoreBootstrap, CoreContext};
use hermes_shared::config::HermesConfig;
use hermes_shared::logging;

/// Upper bound on graceful shutdown before forcing exit
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    info!("Starting Hermes Routing Server...");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));

    let config = HermesConfig::load().map_err(|e| format!("Failed to load configuration: {e}"))?;
    let context = CoreContext::from_config(config)
        .await
        .map_err(|e| format!("Failed to construct core context: {e}"))?;

    // The unclaimed queue must exist before the first claim announcement
    context
        .client
        .ensure_unclaimed_queue()
        .await
        .map_err(|e| format!("Failed to ensure unclaimed queue: {e}"))?;

    let handle = CoreBootstrap::bootstrap(context)
        .map_err(|e| format!("Failed to bootstrap core: {e}"))?;

    info!("Hermes Routing Server started");
    info!("   Queue backend: {}", handle.context.client.provider_name());
    info!(
        "   Storage backend: {}",
        handle.context.storage.provider_name()
    );
    info!("   Press Ctrl+C to shutdown gracefully");

    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle.stop()).await {
        Ok(Ok(())) => info!("Core stopped"),
        Ok(Err(e)) => error!("Failed to stop core cleanly: {}", e),
        Err(_) => error!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Graceful shutdown timed out, forcing exit"
        ),
    }

    info!("Hermes Routing Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
