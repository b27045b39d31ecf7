//! Game Service
//!
//! Hosts room repositories for every registered application. The transport
//! layer that terminates client connections drives the repositories through
//! the library API.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Install the Prometheus exporter
//! 3. Connect to PostgreSQL
//! 4. Build one repository per row of the `app` table
//! 5. Wait for shutdown signal, then abort live rooms

#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;

use common::secret::ExposeSecret;
use game_service::config::Config;
use game_service::game::{PgRoomStore, Repository, RoomStore};
use game_service::observability::init_metrics_exporter;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "game_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Game Service");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        host_id = config.game.host_id,
        retry_count = config.game.retry_count,
        max_room_number = config.game.max_room_number,
        metrics_bind_address = %config.metrics_bind_address,
        "Configuration loaded successfully"
    );

    // Metrics exporter must be installed before anything is recorded
    let metrics_addr: SocketAddr = config.metrics_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.metrics_bind_address, "Invalid metrics bind address");
        format!("Invalid metrics bind address: {e}")
    })?;
    init_metrics_exporter(metrics_addr).map_err(|e| {
        error!(error = %e, "Failed to install Prometheus exporter");
        e
    })?;
    info!(addr = %metrics_addr, "Prometheus exporter listening");

    info!("Connecting to database...");
    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(config.database_url.expose_secret())
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;
    info!("Database connection established");

    let store: Arc<dyn RoomStore> = Arc::new(PgRoomStore::new(db_pool));
    let repos = Repository::new_repos(store, &config.game)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to load applications");
            e
        })?;

    info!(apps = repos.len(), "Repositories ready");

    shutdown_signal().await;
    info!("Shutdown signal received");

    for repo in repos.values() {
        repo.shutdown().await;
    }

    info!("Game Service shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
