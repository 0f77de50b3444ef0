//! Relayer status API
//!
//! - GET /api/v1/transfers - journal view with pagination
//! - GET /health - 200 "OK" when the database, EVM node, and Canton ledger
//!   are all reachable
//! - GET /status - queue counts and uptime
//! - GET /metrics - Prometheus metrics

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use eyre::Result;
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::info;

use canton_rs::canton::CantonClient;
use canton_rs::evm::EvmClient;

use crate::db;

#[derive(Clone)]
pub struct ApiState {
    pub db: PgPool,
    pub evm: Arc<EvmClient>,
    pub canton: Arc<CantonClient>,
    pub started_at: Instant,
}

#[derive(Debug, Deserialize)]
pub struct TransfersQuery {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    100
}

#[derive(Serialize)]
struct TransfersResponse {
    transfers: Vec<TransferView>,
}

/// User-visible transfer states collapse the internal machine:
/// detected/mapped/ready -> Pending, submitted/confirmed -> Processing,
/// closed -> Complete. Failed rows stay visible with their last error.
#[derive(Serialize)]
struct TransferView {
    id: i64,
    direction: String,
    state: String,
    status: String,
    evm_tx_hash: Option<String>,
    canton_contract_id: Option<String>,
    token_symbol: String,
    amount: String,
    evm_address: Option<String>,
    fingerprint: String,
    attempts: i32,
    last_error: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

fn user_state(status: &str) -> &'static str {
    match status {
        "detected" | "mapped" | "ready" => "Pending",
        "submitted" | "confirmed" => "Processing",
        "closed" => "Complete",
        "failed" => "Failed",
        _ => "Unknown",
    }
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    uptime_seconds: u64,
    queues: QueueStatus,
}

#[derive(Serialize)]
struct QueueStatus {
    pending_deposits: i64,
    submitted_deposits: i64,
    pending_withdrawals: i64,
    submitted_withdrawals: i64,
    failed_transfers: i64,
}

/// Start the status API server
pub async fn serve(addr: SocketAddr, state: ApiState) -> Result<()> {
    let app = Router::new()
        .route("/api/v1/transfers", get(list_transfers))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Status API listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn list_transfers(
    State(state): State<ApiState>,
    Query(query): Query<TransfersQuery>,
) -> impl IntoResponse {
    let limit = query.limit.clamp(1, 1000);
    match db::list_transfers(&state.db, limit, query.offset.max(0)).await {
        Ok(rows) => {
            let transfers = rows
                .into_iter()
                .map(|t| TransferView {
                    state: user_state(&t.status).to_string(),
                    id: t.id,
                    direction: t.direction,
                    status: t.status,
                    evm_tx_hash: t.evm_tx_hash,
                    canton_contract_id: t.canton_contract_id,
                    token_symbol: t.token_symbol,
                    amount: t.amount,
                    evm_address: t.evm_address,
                    fingerprint: t.fingerprint,
                    attempts: t.attempts,
                    last_error: t.last_error,
                    created_at: t.created_at,
                    updated_at: t.updated_at,
                })
                .collect();
            Json(TransfersResponse { transfers }).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to list transfers: {}", e),
        )
            .into_response(),
    }
}

/// Probes the three dependencies the pipelines cannot run without
async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    if db::ping(&state.db).await.is_err() {
        return (StatusCode::SERVICE_UNAVAILABLE, "database unreachable");
    }
    if state.evm.block_number().await.is_err() {
        return (StatusCode::SERVICE_UNAVAILABLE, "evm node unreachable");
    }
    if state.canton.ledger_end().await.is_err() {
        return (StatusCode::SERVICE_UNAVAILABLE, "canton ledger unreachable");
    }
    (StatusCode::OK, "OK")
}

async fn status(State(state): State<ApiState>) -> impl IntoResponse {
    let queues = QueueStatus {
        pending_deposits: db::count_transfers_by_status(&state.db, "deposit", "detected")
            .await
            .unwrap_or(0),
        submitted_deposits: db::count_transfers_by_status(&state.db, "deposit", "submitted")
            .await
            .unwrap_or(0),
        pending_withdrawals: db::count_transfers_by_status(&state.db, "withdrawal", "detected")
            .await
            .unwrap_or(0),
        submitted_withdrawals: db::count_transfers_by_status(&state.db, "withdrawal", "submitted")
            .await
            .unwrap_or(0),
        failed_transfers: db::count_transfers_by_status(&state.db, "deposit", "failed")
            .await
            .unwrap_or(0)
            + db::count_transfers_by_status(&state.db, "withdrawal", "failed")
                .await
                .unwrap_or(0),
    };

    Json(StatusResponse {
        status: "ok".to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        queues,
    })
}

async fn metrics_endpoint() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new()).into_response();
    }
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_state_mapping() {
        assert_eq!(user_state("detected"), "Pending");
        assert_eq!(user_state("mapped"), "Pending");
        assert_eq!(user_state("ready"), "Pending");
        assert_eq!(user_state("submitted"), "Processing");
        assert_eq!(user_state("confirmed"), "Processing");
        assert_eq!(user_state("closed"), "Complete");
        assert_eq!(user_state("failed"), "Failed");
        assert_eq!(user_state("bogus"), "Unknown");
    }
}
