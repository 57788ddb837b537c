//! API routes.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::handlers::hls::serve_hls;
use crate::handlers::jobs::{
    create_upload, delete_job, job_status, list_jobs, queue_stats, retry_job,
};
use crate::handlers::{health, ready};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, rate_limit_middleware, request_logging, RateLimiterCache};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let rate_limiter = Arc::new(RateLimiterCache::new(state.config.rate_limit_rps));

    // Admission surface: rate limited per client.
    let v1_routes = Router::new()
        .route("/v1/upload", post(create_upload))
        .route("/v1/jobs", get(list_jobs))
        .route("/v1/jobs/:job_id/status", get(job_status))
        .route("/v1/jobs/:job_id/retry", post(retry_job))
        .route("/v1/jobs/:job_id", delete(delete_job))
        .route("/v1/queue/stats", get(queue_stats))
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    // Streaming surface: players fetch many segments per second, so no
    // admission rate limit here.
    let hls_routes = Router::new().route("/hls/*path", get(serve_hls));

    let upload_api = Router::new().merge(v1_routes).merge(hls_routes);

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api/upload", upload_api)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer())
        .with_state(state)
}
