//! HLS proxy handlers.
//!
//! Players never see the private bucket: playlists are rewritten on the fly
//! to point back at this proxy, and segments are streamed through without
//! buffering.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use tokio_util::io::ReaderStream;
use tracing::debug;

use vodflow_models::Resolution;

use crate::error::{ApiError, ApiResult};
use crate::metrics::record_segment_served;
use crate::playlist::{is_segment_name, rewrite_master, rewrite_variant};
use crate::state::AppState;

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const SEGMENT_CONTENT_TYPE: &str = "video/MP2T";
/// Segments are immutable; let players and CDNs cache them for a year.
const SEGMENT_CACHE_CONTROL: &str = "public, max-age=31536000";

/// Dispatch `/hls/{...}` requests by suffix: master playlist, variant
/// playlist, or segment.
pub async fn serve_hls(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let path = path.trim_start_matches('/');
    if path.split('/').any(|part| part.is_empty() || part == "..") {
        return Err(ApiError::validation("invalid HLS path"));
    }

    if let Some(prefix) = path.strip_suffix("/master.m3u8") {
        return serve_master(&state, prefix).await;
    }

    if let Some(rest) = path.strip_suffix("/playlist.m3u8") {
        let (prefix, tag) = rest
            .rsplit_once('/')
            .ok_or_else(|| ApiError::not_found(path.to_string()))?;
        return serve_variant(&state, prefix, tag).await;
    }

    if path.ends_with(".ts") {
        let (rest, segment) = path
            .rsplit_once('/')
            .ok_or_else(|| ApiError::not_found(path.to_string()))?;
        let (prefix, tag) = rest
            .rsplit_once('/')
            .ok_or_else(|| ApiError::not_found(path.to_string()))?;
        return serve_segment(&state, prefix, tag, segment, &headers).await;
    }

    Err(ApiError::not_found(path.to_string()))
}

/// Rewritten master playlist.
async fn serve_master(state: &AppState, prefix: &str) -> ApiResult<Response> {
    let key = format!("{prefix}/master.m3u8");
    let stored = state.storage.get_bytes(&key).await?;
    let body = String::from_utf8_lossy(&stored);

    let rewritten = rewrite_master(&body, &state.config.api_base_url, prefix);
    debug!(prefix, "served master playlist");

    playlist_response(rewritten)
}

/// Rewritten variant playlist.
async fn serve_variant(state: &AppState, prefix: &str, tag: &str) -> ApiResult<Response> {
    if Resolution::from_tag(tag).is_none() {
        return Err(ApiError::not_found(format!("unknown rendition {tag}")));
    }

    let key = format!("{prefix}/{tag}/index.m3u8");
    let stored = state.storage.get_bytes(&key).await?;
    let body = String::from_utf8_lossy(&stored);

    let rewritten = rewrite_variant(&body, &state.config.api_base_url, prefix, tag);
    debug!(prefix, tag, "served variant playlist");

    playlist_response(rewritten)
}

/// Stream one segment straight from the bucket to the player. The body is
/// pulled lazily, so a disconnecting client cancels the upstream read.
async fn serve_segment(
    state: &AppState,
    prefix: &str,
    tag: &str,
    segment: &str,
    headers: &HeaderMap,
) -> ApiResult<Response> {
    if Resolution::from_tag(tag).is_none() {
        return Err(ApiError::not_found(format!("unknown rendition {tag}")));
    }
    if !is_segment_name(segment) {
        return Err(ApiError::validation(format!(
            "invalid segment name {segment}"
        )));
    }

    let key = format!("{prefix}/{tag}/{segment}");

    // Existence and size up front: missing segments must 404 before any
    // body byte is written.
    let info = state.storage.head(&key).await?;

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok());

    let stream = state.storage.get_stream(&key, range).await?;

    let status = if stream.is_partial {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };
    let content_length = if stream.is_partial {
        stream.content_length
    } else {
        info.size
    };

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, SEGMENT_CONTENT_TYPE)
        .header(header::CONTENT_LENGTH, content_length)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CACHE_CONTROL, SEGMENT_CACHE_CONTROL)
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*");

    if let Some(content_range) = &stream.content_range {
        builder = builder.header(header::CONTENT_RANGE, content_range);
    }

    record_segment_served();
    debug!(key, partial = stream.is_partial, "streaming segment");

    let reader = ReaderStream::new(stream.body.into_async_read());
    builder
        .body(Body::from_stream(reader))
        .map_err(|e| ApiError::internal(format!("failed to build response: {e}")))
}

fn playlist_response(body: String) -> ApiResult<Response> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(Body::from(body))
        .map_err(|e| ApiError::internal(format!("failed to build response: {e}")))
}
