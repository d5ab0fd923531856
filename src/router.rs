//! Axum Router Configuration
//!
//! The service's entire HTTP surface: the call-media WebSocket endpoint
//! plus two diagnostics routes backed by the session registry.

use crate::{registry::SessionSummary, state::AppState, ws::ws_handler};
use axum::{Json, Router, extract::State, routing::get};
use std::sync::Arc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/call-media", get(ws_handler))
        .route("/healthz", get(healthz))
        .route("/sessions", get(list_sessions))
        .with_state(app_state)
}

/// Liveness probe for process supervisors.
async fn healthz() -> &'static str {
    "ok"
}

/// Lists every active session, in insertion order.
async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionSummary>> {
    Json(state.registry.list())
}
