//! HTTP route handlers for the kiosk host.

use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::state::AppState;

mod health;
mod session;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))

        // Session lifecycle
        .route("/session", get(session::get_session))
        .route("/session/start", post(session::start))
        .route("/session/begin", post(session::begin))
        .route("/session/cancel", post(session::cancel))
        .route("/session/retry", post(session::retry))
        .route("/session/resubmit", post(session::resubmit))

        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    Duration::from_secs(10),
                ))
                .layer(CorsLayer::permissive()),
        )
        // Add shared state
        .with_state(state)
}
