//! PolicyAide dashboard HTTP API
//!
//! Axum-based service over the trace/span telemetry tables. The Streamlit-era
//! dashboard's widgets map onto JSON endpoints consumed by `policyaide-cli`.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a pure
//! inner function. The inner functions are directly testable without axum
//! dispatch machinery.
//!
//! Endpoints:
//! - GET  /health               — health check with DB status
//! - GET  /version              — server version info
//! - GET  /agents               — latest system instructions per agent
//! - GET  /agents/performance   — per-agent run/duration/token aggregates
//! - GET  /traces?limit=N       — recent traces with span counts
//! - GET  /traces/{id}/spans    — spans of one trace
//! - POST /agents/instructions  — append an instruction_update span

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use policyaide_core::{telemetry, PolicyAideConfig, PolicyAideError};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Limit clamp for the trace list.
const MAX_TRACE_LIMIT: i64 = 200;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub pool: PgPool,
    pub config: PolicyAideConfig,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/agents", get(agents_handler))
        .route("/agents/performance", get(performance_handler))
        .route("/agents/instructions", post(instructions_handler))
        .route("/traces", get(traces_handler))
        .route("/traces/:trace_id/spans", get(trace_spans_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    pool: PgPool,
    config: PolicyAideConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.dashboard.host, config.dashboard.port);
    let state = Arc::new(HttpState { pool, config });

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("PolicyAide dashboard API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct TracesQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SaveInstructionsRequest {
    pub agent_name: Option<String>,
    pub instructions: Option<String>,
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }
}

fn error_body(msg: impl std::fmt::Display) -> serde_json::Value {
    serde_json::json!({
        "error": msg.to_string(),
        "status": "error",
    })
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check — queries DB and returns (status_code, json_body).
pub async fn health_inner(pool: &PgPool) -> (StatusCode, serde_json::Value) {
    let pg_ver = match policyaide_core::db::health_check(pool).await {
        Ok(v) => v,
        Err(e) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({
                    "status": "unhealthy",
                    "error": e.to_string(),
                }),
            );
        }
    };

    (
        StatusCode::OK,
        serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "postgresql": pg_ver,
        }),
    )
}

/// Inner version — returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "service": "policyaide/1",
    })
}

/// Inner agents list — latest instructions per agent.
pub async fn agents_inner(pool: &PgPool) -> (StatusCode, serde_json::Value) {
    match telemetry::agent_instructions(pool).await {
        Ok(agents) => {
            let count = agents.len();
            (
                StatusCode::OK,
                serde_json::json!({
                    "agents": agents,
                    "count": count,
                }),
            )
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(e)),
    }
}

/// Inner performance aggregates.
pub async fn performance_inner(pool: &PgPool) -> (StatusCode, serde_json::Value) {
    match telemetry::agent_performance(pool).await {
        Ok(rows) => {
            let count = rows.len();
            (
                StatusCode::OK,
                serde_json::json!({
                    "agents": rows,
                    "count": count,
                }),
            )
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(e)),
    }
}

/// Inner trace list — limit clamped to [1, MAX_TRACE_LIMIT], default from config.
pub async fn traces_inner(
    pool: &PgPool,
    config: &PolicyAideConfig,
    limit: Option<i64>,
) -> (StatusCode, serde_json::Value) {
    let limit = limit
        .unwrap_or(config.dashboard.recent_trace_limit)
        .clamp(1, MAX_TRACE_LIMIT);

    match telemetry::recent_traces(pool, limit).await {
        Ok(traces) => {
            let count = traces.len();
            (
                StatusCode::OK,
                serde_json::json!({
                    "traces": traces,
                    "count": count,
                }),
            )
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(e)),
    }
}

/// Inner spans-of-trace. A trace with zero spans yields an empty list with
/// zero aggregates rather than an error.
pub async fn trace_spans_inner(pool: &PgPool, trace_id: &str) -> (StatusCode, serde_json::Value) {
    match telemetry::trace_spans(pool, trace_id).await {
        Ok(spans) => {
            let total_tokens: i64 = spans.iter().map(|s| s.total_tokens()).sum();
            let span_count = spans.len();
            (
                StatusCode::OK,
                serde_json::json!({
                    "trace_id": trace_id,
                    "spans": spans,
                    "span_count": span_count,
                    "total_tokens": total_tokens,
                }),
            )
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(e)),
    }
}

/// Inner instruction save — 400 for blank input, 200 with the new span id.
pub async fn save_instructions_inner(
    pool: &PgPool,
    req: SaveInstructionsRequest,
) -> (StatusCode, serde_json::Value) {
    let agent_name = req.agent_name.unwrap_or_default();
    let instructions = req.instructions.unwrap_or_default();

    match telemetry::record_instruction_update(pool, &agent_name, &instructions).await {
        Ok(span_id) => (
            StatusCode::OK,
            serde_json::json!({
                "saved": true,
                "agent_name": agent_name.trim(),
                "span_id": span_id,
            }),
        ),
        Err(PolicyAideError::Validation(msg)) => (StatusCode::BAD_REQUEST, error_body(msg)),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(e)),
    }
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.pool).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn agents_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = agents_inner(&state.pool).await;
    (status, Json(body))
}

pub async fn performance_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = performance_inner(&state.pool).await;
    (status, Json(body))
}

pub async fn traces_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<TracesQuery>,
) -> impl IntoResponse {
    let (status, body) = traces_inner(&state.pool, &state.config, query.limit).await;
    (status, Json(body))
}

pub async fn trace_spans_handler(
    State(state): State<Arc<HttpState>>,
    Path(trace_id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = trace_spans_inner(&state.pool, &trace_id).await;
    (status, Json(body))
}

pub async fn instructions_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<SaveInstructionsRequest>,
) -> impl IntoResponse {
    let (status, body) = save_instructions_inner(&state.pool, req).await;
    (status, Json(body))
}

// ============================================================================
// Unit Tests — pure pieces only; DB-backed paths live in tests/
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // TEST 1: version_inner is pure and returns correct fields
    // ========================================================================
    #[test]
    fn test_version_inner_pure() {
        let v = version_inner();
        assert!(v["version"].is_string(), "version must be string");
        assert_eq!(v["service"], "policyaide/1", "service must be policyaide/1");
    }

    // ========================================================================
    // TEST 2: ErrorResponse serializes with the standard shape
    // ========================================================================
    #[test]
    fn test_error_response_shape() {
        let body = serde_json::to_value(ErrorResponse::new("boom")).unwrap();
        assert_eq!(body["error"], "boom");
        assert_eq!(body["status"], "error");
    }

    // ========================================================================
    // TEST 3: error_body matches ErrorResponse
    // ========================================================================
    #[test]
    fn test_error_body_shape() {
        let body = error_body("db exploded");
        assert_eq!(body["error"], "db exploded");
        assert_eq!(body["status"], "error");
    }
}
