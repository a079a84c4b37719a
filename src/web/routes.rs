use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/stream.mjpg", get(handlers::mjpeg_stream))
        .route("/snapshot.jpg", get(handlers::snapshot))
        .route("/healthz", get(handlers::health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
