//! API integration tests.
//!
//! Router-level tests run against dummy backend configuration: client
//! construction is lazy, so validation paths and static routes are
//! exercised without live services. Flows that need Redis are gated.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use vodflow_api::{create_router, ApiConfig, AppState};

fn test_env() {
    std::env::set_var("S3_ENDPOINT_URL", "http://localhost:9000");
    std::env::set_var("S3_ACCESS_KEY_ID", "test");
    std::env::set_var("S3_SECRET_ACCESS_KEY", "test");
    std::env::set_var("S3_BUCKET_NAME", "videos");
    std::env::set_var("REDIS_URL", "redis://localhost:6379");
}

fn test_router() -> axum::Router {
    test_env();
    let state = AppState::new(ApiConfig::default()).expect("app state");
    create_router(state, None)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_is_up() {
    let app = test_router();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn upload_rejects_keys_outside_raw_videos() {
    let app = test_router();

    let body = serde_json::json!({
        "raw_object_key": "elsewhere/video.mp4",
        "original_filename": "video.mp4",
        "original_size": 1024,
        "mime_type": "video/mp4",
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/upload/v1/upload")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "validation_error");
}

#[tokio::test]
async fn upload_rejects_sources_over_the_cap() {
    let app = test_router();

    let body = serde_json::json!({
        "raw_object_key": "raw-videos/u-big.mp4",
        "original_filename": "big.mp4",
        // One byte over 5 GiB
        "original_size": 5u64 * 1024 * 1024 * 1024 + 1,
        "mime_type": "video/mp4",
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/upload/v1/upload")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_rejects_empty_sources() {
    let app = test_router();

    let body = serde_json::json!({
        "raw_object_key": "raw-videos/u-zero.mp4",
        "original_filename": "zero.mp4",
        "original_size": 0,
        "mime_type": "video/mp4",
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/upload/v1/upload")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn hls_rejects_path_traversal() {
    let app = test_router();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/upload/hls/p/../secrets/master.m3u8")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn hls_rejects_unknown_renditions_and_bad_segment_names() {
    let app = test_router();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/upload/hls/p/240p/playlist.m3u8")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let app = test_router();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/upload/hls/p/360p/evil.ts")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn job_listing_round_trips() {
    dotenvy::dotenv().ok();
    let app = test_router();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/upload/v1/jobs?limit=5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["jobs"].is_array());
    assert!(json["total"].is_u64());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn status_of_unknown_job_is_404() {
    dotenvy::dotenv().ok();
    let app = test_router();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/upload/v1/jobs/no-such-job/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
