//! Main Entrypoint for the Callbridge Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing tracing at the configured level.
//! 3. Constructing the shared application state.
//! 4. Starting the heartbeat supervisor task.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use callbridge::{config::Config, router::create_router, state::AppState};
use std::sync::Arc;
use tracing::info;

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Shared State and Supervisor ---
    let heartbeat_period = config.heartbeat_period;
    let bind_address = config.bind_address;
    let app_state = Arc::new(AppState::new(config));

    // Started once, runs for the process lifetime.
    tokio::spawn(app_state.heartbeat.clone().run(heartbeat_period));

    // --- 4. Create Router ---
    let app = create_router(app_state);

    // --- 5. Start Server ---
    info!(
        %bind_address,
        heartbeat_secs = heartbeat_period.as_secs(),
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(bind_address).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server has shut down.");
    Ok(())
}
