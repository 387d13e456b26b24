use anyhow::{Context, Result};
use axum::{extract::State, response::Html, routing::get, Json, Router};
use serde::Serialize;

use fedtxn_core::config::CoordinatorConfig;
use fedtxn_core::metrics::TransactionMetricsSnapshot;
use fedtxn_core::{TransactionInfo, TransactionManager};

#[derive(Clone)]
struct StatusState {
    manager: TransactionManager,
}

#[derive(Serialize)]
struct StatusPayload {
    generated_at_ms: u64,
    metrics: TransactionMetricsSnapshot,
    transactions: Vec<TransactionInfo>,
}

pub fn spawn_status_server(config: &CoordinatorConfig, manager: TransactionManager) -> Result<()> {
    if !config.status_enabled {
        return Ok(());
    }

    let addr = config
        .status_addr()
        .with_context(|| "invalid status server bind address")?;

    let state = StatusState { manager };

    let prefix = normalize_prefix(&config.status_path_prefix);
    let root_path = format!("{prefix}/");
    let json_path = format!("{prefix}/status.json");

    let app = Router::new()
        .route(&root_path, get(status_page))
        .route(&json_path, get(status_json))
        .with_state(state);

    tokio::spawn(async move {
        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                if let Err(err) = axum::serve(listener, app).await {
                    tracing::error!(%err, "status server failed");
                }
            }
            Err(err) => {
                tracing::error!(%err, "status server bind failed");
            }
        }
    });

    tracing::info!(%addr, "status server listening");
    Ok(())
}

async fn status_page() -> Html<&'static str> {
    Html(STATUS_PAGE)
}

async fn status_json(State(state): State<StatusState>) -> Json<StatusPayload> {
    let payload = StatusPayload {
        generated_at_ms: now_millis(),
        metrics: state.manager.metrics(),
        transactions: state.manager.get_all_transaction_infos(),
    };
    Json(payload)
}

fn now_millis() -> u64 {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_millis() as u64
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

const STATUS_PAGE: &str = include_str!("status.html");
