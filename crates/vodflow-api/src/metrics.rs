//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Initialize the Prometheus metrics recorder.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "vodflow_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vodflow_http_request_duration_seconds";

    pub const JOBS_ENQUEUED_TOTAL: &str = "vodflow_jobs_enqueued_total";
    pub const SEGMENTS_SERVED_TOTAL: &str = "vodflow_segments_served_total";
}

/// Record an enqueued job.
pub fn record_job_enqueued(queue: &'static str) {
    counter!(names::JOBS_ENQUEUED_TOTAL, &[("queue", queue)]).increment(1);
}

/// Record a streamed segment.
pub fn record_segment_served() {
    counter!(names::SEGMENTS_SERVED_TOTAL).increment(1);
}

/// Middleware recording request count and latency per method and status.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().to_string();
    let path_group = group_path(request.uri().path());
    let start = Instant::now();

    let response = next.run(request).await;

    let labels = [
        ("method", method),
        ("path", path_group.to_string()),
        ("status", response.status().as_u16().to_string()),
    ];
    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels)
        .record(start.elapsed().as_secs_f64());

    response
}

/// Collapse parameterized paths so metrics cardinality stays bounded.
fn group_path(path: &str) -> &'static str {
    if path.contains("/hls/") {
        "/hls"
    } else if path.contains("/v1/jobs") {
        "/v1/jobs"
    } else if path.contains("/v1/upload") {
        "/v1/upload"
    } else if path.contains("/v1/queue") {
        "/v1/queue"
    } else if path.starts_with("/health") || path.starts_with("/ready") {
        "/health"
    } else if path.starts_with("/metrics") {
        "/metrics"
    } else {
        "other"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_grouping_bounds_cardinality() {
        assert_eq!(group_path("/api/upload/hls/P/360p/segment000.ts"), "/hls");
        assert_eq!(group_path("/api/upload/v1/jobs/abc/status"), "/v1/jobs");
        assert_eq!(group_path("/api/upload/v1/upload"), "/v1/upload");
        assert_eq!(group_path("/health"), "/health");
        assert_eq!(group_path("/favicon.ico"), "other");
    }
}
