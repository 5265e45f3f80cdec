//! Health and metrics handlers (ungated).

use axum::extract::State;
use serde::Serialize;

use crate::http::{ApiResponse, ApiResult};
use crate::metrics;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub driver: &'static str,
    pub uptime_secs: u64,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> ApiResult {
    let health = HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        driver: state.gateway.driver_id(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    };
    Ok(ApiResponse::data(serde_json::to_value(health)?))
}

/// Aggregates only. Session ids are bearer credentials and never leave the
/// gated endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    pub queries: metrics::QueryMetricsSnapshot,
    pub session_count: usize,
    pub max_sessions: usize,
    pub pool_connections: u64,
    pub pool_idle_connections: u64,
}

/// GET /metrics
pub async fn metrics(State(state): State<AppState>) -> ApiResult {
    let registry = state.sessions.registry();
    let sessions = registry.list().await;
    let response = MetricsResponse {
        queries: metrics::snapshot(),
        session_count: sessions.len(),
        max_sessions: registry.max_sessions(),
        pool_connections: sessions.iter().map(|s| u64::from(s.pool_size)).sum(),
        pool_idle_connections: sessions.iter().map(|s| s.pool_idle as u64).sum(),
    };
    Ok(ApiResponse::data(serde_json::to_value(response)?))
}
