//! Job admission and management handlers.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vodflow_jobs::{JobFilter, JobPatch};
use vodflow_models::{
    derive_output_prefix, is_raw_video_key, Job, JobError, JobId, JobStatus, RenditionProgress,
    Resolution, Stage,
};
use vodflow_queue::QueueName;

use crate::error::{ApiError, ApiResult};
use crate::metrics::record_job_enqueued;
use crate::state::AppState;

// ============================================================================
// Request / response types
// ============================================================================

/// Stored-object reference handed over by the edge after it persisted the
/// upload. Multipart parsing happens there, not here.
#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub raw_object_key: String,
    pub original_filename: String,
    pub original_size: u64,
    pub mime_type: String,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub job_id: JobId,
    pub status_url: String,
}

/// User-facing job view. Same shape as the record minus store internals.
#[derive(Debug, Serialize)]
pub struct JobView {
    pub job_id: JobId,
    pub original_filename: String,
    pub original_size: u64,
    pub mime_type: String,
    pub raw_object_key: String,
    pub output_prefix: String,
    pub status: JobStatus,
    pub stage: Stage,
    pub progress: u8,
    pub per_resolution: BTreeMap<Resolution, RenditionProgress>,
    pub attempts: u32,
    pub max_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hls_master_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queued_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.job_id,
            original_filename: job.original_filename,
            original_size: job.original_size,
            mime_type: job.mime_type,
            raw_object_key: job.raw_object_key,
            output_prefix: job.output_prefix,
            status: job.status,
            stage: job.stage,
            progress: job.progress,
            per_resolution: job.per_resolution,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            hls_master_url: job.hls_master_url,
            error: job.error,
            created_at: job.created_at,
            queued_at: job.queued_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            failed_at: job.failed_at,
            correlation_id: job.correlation_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub jobs: Vec<JobView>,
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// Accept a stored upload, create the fast-lane job, return 202.
///
/// POST /v1/upload
pub async fn create_upload(
    State(state): State<AppState>,
    Json(body): Json<UploadRequest>,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    if !is_raw_video_key(&body.raw_object_key) {
        return Err(ApiError::validation(
            "raw_object_key must point under raw-videos/",
        ));
    }
    if body.original_filename.trim().is_empty() {
        return Err(ApiError::validation("original_filename is required"));
    }
    if body.original_size == 0 {
        return Err(ApiError::validation("source video is empty"));
    }
    if body.original_size > state.config.max_source_bytes {
        return Err(ApiError::validation(format!(
            "source exceeds the {} byte cap",
            state.config.max_source_bytes
        )));
    }

    let output_prefix = derive_output_prefix(&body.raw_object_key);
    let job = Job::new(
        body.original_filename,
        body.original_size,
        body.mime_type,
        body.raw_object_key,
        output_prefix,
    )
    .with_correlation_id(body.correlation_id);

    let created = state.scheduler.submit(QueueName::Fast, &job).await?;
    record_job_enqueued("fast");

    info!(job_id = %created.job_id, "upload admitted");

    let status_url = format!(
        "{}/v1/jobs/{}/status",
        state.config.api_base_url, created.job_id
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            job_id: created.job_id,
            status_url,
        }),
    ))
}

/// Job detail.
///
/// GET /v1/jobs/{job_id}/status
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobView>> {
    let job = state
        .scheduler
        .jobs()
        .get(&JobId::from_string(job_id))
        .await?;
    Ok(Json(job.into()))
}

/// List jobs newest-first.
///
/// GET /v1/jobs?status=&limit=&offset=
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ListResponse>> {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(s) => Some(parse_status(s)?),
    };

    let filter = JobFilter {
        status,
        limit: query.limit.min(200),
        offset: query.offset,
    };
    let (jobs, total) = state.scheduler.jobs().list(&filter).await?;

    Ok(Json(ListResponse {
        jobs: jobs.into_iter().map(JobView::from).collect(),
        total,
        limit: filter.limit,
        offset: filter.offset,
    }))
}

/// Re-queue a failed job with a fresh attempt budget.
///
/// POST /v1/jobs/{job_id}/retry
pub async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobView>> {
    let job_id = JobId::from_string(job_id);
    let job = state.scheduler.jobs().get(&job_id).await?;

    if job.status != JobStatus::Failed {
        return Err(ApiError::precondition(format!(
            "job is {}, only failed jobs can be retried",
            job.status
        )));
    }

    // Compare-and-swap back to queued. Exactly one of two concurrent
    // retries wins; the loser sees the precondition fail.
    let patch = JobPatch::new()
        .status(JobStatus::Queued)
        .restart_progress()
        .restart_attempts()
        .clear_error();
    let requeued = state
        .scheduler
        .jobs()
        .update(&job_id, &patch, Some(JobStatus::Failed))
        .await
        .map_err(|e| match e {
            vodflow_jobs::JobStoreError::Precondition(_) => {
                ApiError::conflict("job was already retried")
            }
            other => other.into(),
        })?;

    let queue = queue_for_stage(requeued.stage);
    state.scheduler.requeue(queue, &requeued).await?;
    record_job_enqueued(queue.as_str());

    info!(job_id = %job_id, queue = %queue, "job retried");
    Ok(Json(requeued.into()))
}

/// Delete a non-processing job and reap its stored output when no sibling
/// stage still references it.
///
/// DELETE /v1/jobs/{job_id}
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let job_id = JobId::from_string(job_id);
    let job = state.scheduler.jobs().get(&job_id).await?;

    state.scheduler.jobs().delete(&job_id).await?;

    // Both stages write under the same prefix; keep the objects while the
    // sibling record is still around.
    if sibling_record_exists(&state, &job_id).await {
        info!(job_id = %job_id, "sibling stage still present, keeping stored output");
    } else {
        if let Err(e) = state.storage.delete_prefix(&job.output_prefix).await {
            warn!(job_id = %job_id, error = %e, "failed to reap HLS output");
        }
        if let Err(e) = state.storage.delete_prefix(&job.raw_object_key).await {
            warn!(job_id = %job_id, error = %e, "failed to reap source object");
        }
    }

    Ok(Json(serde_json::json!({ "deleted": job_id })))
}

/// Queue and job-store aggregates.
///
/// GET /v1/queue/stats
pub async fn queue_stats(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let fast = state.scheduler.stats(QueueName::Fast).await?;
    let background = state.scheduler.stats(QueueName::Background).await?;
    let counts = state.scheduler.jobs().count_by_status().await?;

    let jobs: BTreeMap<&'static str, u64> = counts
        .into_iter()
        .map(|(status, count)| (status.as_str(), count))
        .collect();

    Ok(Json(serde_json::json!({
        "queues": { "fast": fast, "background": background },
        "jobs": jobs,
    })))
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_status(s: &str) -> ApiResult<JobStatus> {
    match s {
        "pending" => Ok(JobStatus::Pending),
        "queued" => Ok(JobStatus::Queued),
        "processing" => Ok(JobStatus::Processing),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        other => Err(ApiError::validation(format!("unknown status: {other}"))),
    }
}

fn queue_for_stage(stage: Stage) -> QueueName {
    match stage {
        Stage::Fast => QueueName::Fast,
        Stage::Background => QueueName::Background,
    }
}

/// Whether the other stage of the same upload still has a record.
async fn sibling_record_exists(state: &AppState, job_id: &JobId) -> bool {
    let sibling_id = match job_id.as_str().strip_suffix("-bg") {
        Some(fast_id) => JobId::from_string(fast_id),
        None => JobId::from_string(format!("{job_id}-bg")),
    };
    state.scheduler.jobs().get(&sibling_id).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing() {
        assert_eq!(parse_status("queued").unwrap(), JobStatus::Queued);
        assert_eq!(parse_status("failed").unwrap(), JobStatus::Failed);
        assert!(parse_status("bogus").is_err());
    }

    #[test]
    fn stage_to_queue_mapping() {
        assert_eq!(queue_for_stage(Stage::Fast), QueueName::Fast);
        assert_eq!(queue_for_stage(Stage::Background), QueueName::Background);
    }

    #[test]
    fn job_view_hides_store_internals() {
        let mut job = Job::new(
            "a.mp4",
            10,
            "video/mp4",
            "raw-videos/u-a.mp4",
            "u-a",
        );
        job.version = 7;
        let view: JobView = job.into();
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("version").is_none());
        assert_eq!(json["status"], "queued");
        assert_eq!(json["stage"], "fast");
    }
}
