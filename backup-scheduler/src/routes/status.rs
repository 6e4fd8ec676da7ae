//! Plain-text status page and health check.

use crate::state::AppState;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(status))
        .route("/status", get(status))
        .route("/health", get(health))
}

#[derive(Deserialize)]
struct StatusQuery {
    lines: Option<usize>,
}

/// GET /status - newest log lines, oldest first
async fn status(State(state): State<Arc<AppState>>, Query(query): Query<StatusQuery>) -> String {
    let lines = query.lines.unwrap_or(state.logs.capacity());
    let mut body = state.logs.tail(lines).join("\n");
    body.push('\n');
    body
}

/// GET /health - Health check endpoint
async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "running": state.run_lock.try_lock().is_err(),
    }))
}
