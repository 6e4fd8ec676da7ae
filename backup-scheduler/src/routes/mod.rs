pub mod snapshots;
pub mod status;

use crate::state::AppState;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(status::router())
        .nest("/api", snapshots::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
