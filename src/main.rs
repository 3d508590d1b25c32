//! coin-ledger daemon
//!
//! Assembles the transfer pipeline against Postgres and runs the
//! confirmation worker until shutdown. The transport adapter that calls
//! `TransferOrchestrator` lives outside this crate.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coin_ledger::bus::InMemoryBus;
use coin_ledger::ledger::PgLedgerStore;
use coin_ledger::notify::LogNotifier;
use coin_ledger::settlement::MockSettlement;
use coin_ledger::{App, Config};

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coin_ledger=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;

    tracing::info!("Starting coin-ledger");
    tracing::info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    coin_ledger::db::verify_connection(&pool).await?;

    if !coin_ledger::db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");

    let ledger = Arc::new(PgLedgerStore::new(pool.clone()));
    let settlement = Arc::new(MockSettlement::new());
    let bus = Arc::new(InMemoryBus::new());
    let notifier = Arc::new(LogNotifier::new());

    let app = App::assemble(ledger, settlement, bus, notifier, config.worker_config()).await;

    tracing::info!("Transfer pipeline assembled, confirmation worker running");

    shutdown_signal().await;

    tracing::info!("Shutting down...");
    app.shutdown().await;
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
