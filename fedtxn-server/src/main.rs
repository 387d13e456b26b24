//! Standalone coordinator process.
//!
//! This binary is an embedding skeleton: it starts with an empty catalog
//! directory and exposes only the read-only status endpoint. Engines embed
//! `fedtxn-core`, register their catalogs on the `CatalogManager` and drive
//! transactions through the `TransactionManager` they build here.

use std::sync::Arc;

use anyhow::{Context, Result};
use fedtxn_core::{CatalogManager, CoordinatorConfig, TransactionManager};
use tokio::runtime::Handle;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

mod status;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = CoordinatorConfig::load().context("failed to load configuration")?;
    init_tracing(&config);
    info!("coordinator config:\n{:?}", config);

    let catalogs = Arc::new(CatalogManager::new());
    let manager = TransactionManager::new(&config, catalogs, Handle::current())
        .context("failed to initialize transaction manager")?;

    let sweeper = manager.spawn_idle_sweeper();
    status::spawn_status_server(&config, manager.clone())
        .context("failed to start status server")?;

    info!("transaction coordinator running");
    wait_for_shutdown().await;

    sweeper.abort();
    abort_live_transactions(&manager).await;

    info!("coordinator shutdown complete");
    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "failed to listen for CTRL+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(%err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received SIGINT, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("received SIGTERM, initiating graceful shutdown");
        }
    }
}

/// Roll back whatever is still open so backends do not keep dangling transactions.
async fn abort_live_transactions(manager: &TransactionManager) {
    let live = manager.get_all_transaction_infos();
    if live.is_empty() {
        return;
    }
    info!(count = live.len(), "aborting live transactions");
    for info in live {
        if let Err(err) = manager.async_abort(&info.transaction_id).await {
            warn!(
                transaction_id = %info.transaction_id,
                error = %err,
                "failed to abort transaction during shutdown"
            );
        }
    }
}

fn init_tracing(config: &CoordinatorConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,fedtxn_core::transaction=debug"));

    if config.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(FmtSpan::CLOSE)
            .init();
    } else {
        tracing_subscriber::fmt()
            .compact()
            .with_env_filter(filter)
            .with_target(false)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(FmtSpan::CLOSE)
            .init();
    }
}
