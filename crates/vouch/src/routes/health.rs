//! Health check endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
}

/// Basic health check (is the server running?)
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.uptime_secs(),
    })
}

#[derive(Serialize)]
pub struct ReadyResponse {
    status: &'static str,
    store: bool,
}

/// Readiness check (is the evidence store reachable?)
pub async fn ready_check(
    State(state): State<AppState>,
) -> Result<Json<ReadyResponse>, StatusCode> {
    match state.store.health().await {
        Ok(()) => Ok(Json(ReadyResponse {
            status: "ready",
            store: true,
        })),
        Err(e) => {
            tracing::warn!(error = %e, "Evidence store not ready");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
