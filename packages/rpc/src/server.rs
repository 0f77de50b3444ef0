//! HTTP server: JSON-RPC dispatch, registration, health, metrics
//!
//! Endpoints:
//! - POST /rpc - the erc20_* methods plus the Ethereum subset
//! - POST /eth - the Ethereum JSON-RPC subset only
//! - POST /register - custodial/native registration
//! - GET /health - probes DB, EVM node, and Canton
//! - GET /metrics - Prometheus text format
//!
//! Write methods pass through a bounded submission semaphore; when the
//! downstream queue is full the request is rejected with 429 before any
//! ledger work starts. A global rate limiter fronts the whole router.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use bigdecimal::BigDecimal;
use eyre::Result;
use prometheus::{Encoder, TextEncoder};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::GlobalKeyExtractor;
use tower_governor::GovernorLayer;
use tracing::info;

use alloy::primitives::Address;
use canton_rs::evm::EvmClient;

use crate::auth::verify_signed_request;
use crate::db;
use crate::erc20::Facade;
use crate::eth;
use crate::metrics::Metrics;
use crate::registration::{self, RegisterRequest};
use crate::rpc::{JsonRpcRequest, JsonRpcResponse, RpcError, ERR_PARSE};

#[derive(Clone)]
pub struct AppState {
    pub facade: Arc<Facade>,
    pub evm: Arc<EvmClient>,
    pub metrics: Arc<Metrics>,
    pub submissions: Arc<Semaphore>,
}

pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    rate_limit_per_hour: u32,
) -> Result<()> {
    // Replenish one request slot every 3600/rate seconds, with a small burst
    let period_ms = (3_600_000u64 / rate_limit_per_hour.max(1) as u64).max(1);
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(GlobalKeyExtractor)
            .per_millisecond(period_ms)
            .burst_size(rate_limit_per_hour.clamp(1, 60))
            .finish()
            .expect("governor config is valid"),
    );

    let app = Router::new()
        .route("/rpc", post(handle_rpc))
        .route("/eth", post(handle_eth))
        .route("/register", post(handle_register))
        .layer(GovernorLayer::new(governor_config))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "RPC facade listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn handle_rpc(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    dispatch_body(&state, &headers, &body, true).await
}

async fn handle_eth(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    dispatch_body(&state, &headers, &body, false).await
}

async fn dispatch_body(
    state: &AppState,
    headers: &HeaderMap,
    body: &str,
    allow_erc20: bool,
) -> axum::response::Response {
    let request: JsonRpcRequest = match serde_json::from_str(body) {
        Ok(req) => req,
        Err(_) => {
            let response = JsonRpcResponse::err(
                Value::Null,
                RpcError::new(ERR_PARSE, "request body is not valid JSON-RPC"),
            );
            return Json(response).into_response();
        }
    };

    let method = request.method.clone();
    let id = request.id.clone();
    state.metrics.requests_total.with_label_values(&[method.as_str()]).inc();
    let started = Instant::now();

    // Writes are bounded by the submission queue; reject early when full
    let _permit = if is_write_method(&method) {
        match state.submissions.clone().try_acquire_owned() {
            Ok(permit) => {
                state.metrics.queue_depth.inc();
                Some(permit)
            }
            Err(_) => {
                state
                    .metrics
                    .rejected_backpressure_total
                    .with_label_values(&["queue_full"])
                    .inc();
                return (StatusCode::TOO_MANY_REQUESTS, "submission queue full").into_response();
            }
        }
    } else {
        None
    };

    let result = dispatch_method(state, headers, &request, allow_erc20).await;

    if _permit.is_some() {
        state.metrics.queue_depth.dec();
    }
    state
        .metrics
        .request_latency
        .with_label_values(&[method.as_str()])
        .observe(started.elapsed().as_secs_f64());

    let response = match result {
        Ok(value) => JsonRpcResponse::ok(id, value),
        Err(error) => {
            let code = error.code.to_string();
            state
                .metrics
                .request_errors_total
                .with_label_values(&[method.as_str(), code.as_str()])
                .inc();
            JsonRpcResponse::err(id, error)
        }
    };
    Json(response).into_response()
}

/// Optional EIP-191 authentication from the custom headers
fn authenticate(
    headers: &HeaderMap,
    method: &str,
) -> Result<Option<Address>, RpcError> {
    let signature = headers.get("x-signature").and_then(|v| v.to_str().ok());
    let message = headers.get("x-message").and_then(|v| v.to_str().ok());

    match (signature, message) {
        (Some(signature), Some(message)) => {
            verify_signed_request(signature, message, method).map(Some)
        }
        _ => Ok(None),
    }
}

fn require_auth(headers: &HeaderMap, method: &str) -> Result<Address, RpcError> {
    authenticate(headers, method)?.ok_or_else(|| {
        RpcError::new(
            crate::rpc::ERR_UNREGISTERED_CALLER,
            "method requires X-Signature and X-Message headers",
        )
    })
}

fn is_write_method(method: &str) -> bool {
    matches!(method, "erc20_transfer" | "eth_sendRawTransaction")
}

async fn dispatch_method(
    state: &AppState,
    headers: &HeaderMap,
    request: &JsonRpcRequest,
    allow_erc20: bool,
) -> Result<Value, RpcError> {
    let facade = &state.facade;
    let method = request.method.as_str();
    let params = &request.params;

    if method.starts_with("eth_") {
        let caller = authenticate(headers, method)?;
        return eth::dispatch(facade, &state.evm, method, params, caller).await;
    }

    if !allow_erc20 {
        return Err(RpcError::method_not_found(method));
    }

    match method {
        // Unauthenticated reads
        "erc20_name" => Ok(json!(facade.name())),
        "erc20_symbol" => Ok(json!(facade.symbol())),
        "erc20_decimals" => Ok(json!(facade.decimals())),
        "erc20_totalSupply" => {
            let supply = facade.total_supply().await?;
            Ok(json!(supply.to_string()))
        }

        // Authenticated: the signer reads their own balance
        "erc20_balanceOf" => {
            let caller = require_auth(headers, method)?;
            let caller_hex = format!("{:?}", caller).to_lowercase();
            if let Some(requested) = params.get(0).and_then(Value::as_str) {
                if requested.to_lowercase() != caller_hex {
                    return Err(RpcError::new(
                        crate::rpc::ERR_UNREGISTERED_CALLER,
                        "signature does not match queried account",
                    ));
                }
            }
            let user = facade.require_user(&caller_hex).await?;
            let balance = facade.balance_of(&user).await?;
            Ok(json!(balance.to_string()))
        }

        "erc20_transfer" => {
            let caller = require_auth(headers, method)?;
            let caller_hex = format!("{:?}", caller).to_lowercase();
            let (to, amount) = transfer_params(params)?;

            let (tx_hash, _command_id) = facade.transfer(&caller_hex, &to, &amount).await?;
            state
                .metrics
                .transfers_total
                .with_label_values(&["erc20_transfer"])
                .inc();
            Ok(json!(tx_hash))
        }

        other => Err(RpcError::method_not_found(other)),
    }
}

/// Accepts `{"to": ..., "amount": ...}` or positional `[to, amount]`
fn transfer_params(params: &Value) -> Result<(String, BigDecimal), RpcError> {
    let (to, amount) = if params.is_object() {
        (
            params.get("to").and_then(Value::as_str),
            params.get("amount"),
        )
    } else {
        (params.get(0).and_then(Value::as_str), params.get(1))
    };

    let to = to.ok_or_else(|| RpcError::invalid_params("missing 'to'"))?;
    let amount = amount.ok_or_else(|| RpcError::invalid_params("missing 'amount'"))?;

    let amount = match amount {
        Value::String(s) => BigDecimal::from_str(s),
        Value::Number(n) => BigDecimal::from_str(&n.to_string()),
        _ => return Err(RpcError::invalid_params("'amount' must be a decimal")),
    }
    .map_err(|_| RpcError::invalid_params("'amount' is not a valid decimal"))?;

    Ok((to.to_string(), amount))
}

async fn handle_register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> impl IntoResponse {
    let custodial = request.canton_party_id.is_none();
    match registration::register(&state.facade, request).await {
        Ok(response) => {
            state
                .metrics
                .registrations_total
                .with_label_values(&[if custodial { "custodial" } else { "native" }])
                .inc();
            (StatusCode::OK, Json(json!(response))).into_response()
        }
        Err(error) => {
            let status = match error.code {
                crate::rpc::ERR_ALREADY_REGISTERED => StatusCode::CONFLICT,
                crate::rpc::ERR_UNREGISTERED_CALLER => StatusCode::FORBIDDEN,
                crate::rpc::ERR_INVALID_PARAMS => StatusCode::BAD_REQUEST,
                _ => StatusCode::BAD_GATEWAY,
            };
            (
                status,
                Json(json!({ "code": error.code, "message": error.message })),
            )
                .into_response()
        }
    }
}

/// Probes the three dependencies the facade cannot serve without
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    if db::ping(&state.facade.db).await.is_err() {
        return (StatusCode::SERVICE_UNAVAILABLE, "database unreachable");
    }
    if state.evm.block_number().await.is_err() {
        return (StatusCode::SERVICE_UNAVAILABLE, "evm node unreachable");
    }
    if state.facade.canton.ledger_end().await.is_err() {
        return (StatusCode::SERVICE_UNAVAILABLE, "canton ledger unreachable");
    }
    (StatusCode::OK, "OK")
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new()).into_response();
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
    fn test_transfer_params_positional_and_named() {
        let named = json!({"to": "0xabc", "amount": "1.5"});
        let (to, amount) = transfer_params(&named).unwrap();
        assert_eq!(to, "0xabc");
        assert_eq!(amount, BigDecimal::from_str("1.5").unwrap());

        let positional = json!(["0xdef", 2]);
        let (to, amount) = transfer_params(&positional).unwrap();
        assert_eq!(to, "0xdef");
        assert_eq!(amount, BigDecimal::from(2));

        assert!(transfer_params(&json!(["0xdef"])).is_err());
        assert!(transfer_params(&json!({"amount": "1"})).is_err());
        assert!(transfer_params(&json!({"to": "0x", "amount": true})).is_err());
    }

    #[test]
    fn test_is_write_method() {
        assert!(is_write_method("erc20_transfer"));
        assert!(is_write_method("eth_sendRawTransaction"));
        assert!(!is_write_method("erc20_balanceOf"));
        assert!(!is_write_method("eth_call"));
    }
}
