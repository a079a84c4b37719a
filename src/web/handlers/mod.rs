use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
};
use std::sync::Arc;

use super::page::INDEX_HTML;
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::stream::mjpeg::{MjpegStreamer, NO_CACHE, STREAM_CONTENT_TYPE};

// ============================================================================
// Pages & Health
// ============================================================================

/// Viewer page
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Liveness check, independent of camera state
pub async fn health_check() -> impl IntoResponse {
    ([(header::CACHE_CONTROL, "no-cache")], "ok")
}

// ============================================================================
// Streaming
// ============================================================================

/// MJPEG stream endpoint
///
/// Every connection gets its own cursor over the shared relay. The body ends
/// when the client goes away or the server shuts down.
pub async fn mjpeg_stream(State(state): State<Arc<AppState>>) -> Response {
    let client_id = uuid::Uuid::new_v4().to_string();
    let streamer = MjpegStreamer::new(state.relay.clone(), state.shutdown.clone());

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, STREAM_CONTENT_TYPE),
            (header::CACHE_CONTROL, NO_CACHE),
            (header::PRAGMA, "no-cache"),
        ],
        Body::from_stream(streamer.into_stream(client_id)),
    )
        .into_response()
}

/// Single JPEG snapshot
///
/// Waits for the first frame if none has been captured yet.
pub async fn snapshot(State(state): State<Arc<AppState>>) -> Result<Response> {
    let timeout = state.snapshot_timeout();
    let wait = state.relay.snapshot();

    let frame = tokio::select! {
        _ = state.shutdown.cancelled() => {
            return Err(AppError::ServiceUnavailable("Server is shutting down".to_string()));
        }
        frame = async move {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, wait).await.ok(),
                None => Some(wait.await),
            }
        } => frame,
    };

    let frame =
        frame.ok_or_else(|| AppError::ServiceUnavailable("No frame available".to_string()))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, NO_CACHE),
            (header::PRAGMA, "no-cache"),
        ],
        Body::from(frame.data_bytes()),
    )
        .into_response())
}
