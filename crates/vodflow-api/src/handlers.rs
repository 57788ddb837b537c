//! HTTP handlers.

pub mod hls;
pub mod jobs;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use tracing::warn;

use crate::state::AppState;

/// Liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Readiness probe: bucket and queue backend must answer.
pub async fn ready(State(state): State<AppState>) -> Result<Json<serde_json::Value>, StatusCode> {
    if let Err(e) = state.storage.check_connectivity().await {
        warn!(error = %e, "object store not ready");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    if let Err(e) = state.scheduler.stats(vodflow_queue::QueueName::Fast).await {
        warn!(error = %e, "queue backend not ready");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(json!({ "status": "ready" })))
}
