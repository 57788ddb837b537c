//! Durable transcode job records.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::resolution::Resolution;

/// Unique identifier for a transcode job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User-visible job state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Record exists but has not been handed to a queue yet
    #[default]
    Pending,
    /// Waiting in a queue for a worker
    Queued,
    /// A worker holds the entry and is transcoding
    Processing,
    /// All renditions of this stage uploaded
    Completed,
    /// Attempts exhausted
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Terminal states accept no further lifecycle events.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which lane a job runs (or ran) in.
///
/// The fast lane produces only the lowest rendition so a playable URL exists
/// within seconds; the background lane fills in the HD ladder afterwards.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Fast,
    Background,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fast => "fast",
            Stage::Background => "background",
        }
    }

    /// Resolutions encoded by this stage.
    pub fn target_resolutions(&self) -> Vec<Resolution> {
        match self {
            Stage::Fast => vec![Resolution::R360p],
            Stage::Background => vec![Resolution::R480p, Resolution::R720p, Resolution::R1080p],
        }
    }

    /// Resolutions referenced by the master playlist this stage writes.
    /// The background stage re-lists the fast stage's output so the master
    /// grows to the full ladder without ever dropping the playable 360p.
    pub fn playlist_resolutions(&self) -> Vec<Resolution> {
        match self {
            Stage::Fast => vec![Resolution::R360p],
            Stage::Background => Resolution::ALL.to_vec(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-rendition completion state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum RenditionState {
    #[default]
    Pending,
    Encoding,
    Completed,
    Failed,
}

/// Progress of one rendition within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub struct RenditionProgress {
    pub status: RenditionState,
    /// 0-100
    pub progress: u8,
}

/// Error detail recorded on a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobError {
    /// Short classification, e.g. `EncoderError: 360p`
    pub message: String,
    /// Longer context (stderr tail, storage error text)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl JobError {
    pub fn new(message: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            message: message.into(),
            detail,
            occurred_at: Utc::now(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

/// A durable transcode job. Single source of truth for user-visible state.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID; also the queue entry identifier
    pub job_id: JobId,

    /// Original upload filename
    pub original_filename: String,

    /// Original upload size in bytes
    pub original_size: u64,

    /// Original upload MIME type
    pub mime_type: String,

    /// Object-store key of the source video
    pub raw_object_key: String,

    /// Object-store prefix the HLS tree is written under
    pub output_prefix: String,

    /// Current status
    #[serde(default)]
    pub status: JobStatus,

    /// Which lane executes this job
    #[serde(default)]
    pub stage: Stage,

    /// Overall progress 0-100, monotonic within the record
    #[serde(default)]
    pub progress: u8,

    /// Per-rendition progress for the stage's targets
    #[serde(default)]
    pub per_resolution: BTreeMap<Resolution, RenditionProgress>,

    /// Executions so far (first run counts as 1)
    #[serde(default)]
    pub attempts: u32,

    /// Maximum executions before the job fails permanently
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Playable master playlist URL, set on first successful stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hls_master_url: Option<String>,

    /// Error detail when failed
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

    /// Opaque external identifier carried into webhook notifications
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// Store-internal optimistic concurrency counter
    #[serde(default)]
    pub version: u64,
}

impl Job {
    /// Create a job for a freshly stored upload. Starts `queued` on the
    /// fast lane; the caller is expected to enqueue it immediately.
    pub fn new(
        original_filename: impl Into<String>,
        original_size: u64,
        mime_type: impl Into<String>,
        raw_object_key: impl Into<String>,
        output_prefix: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: JobId::new(),
            original_filename: original_filename.into(),
            original_size,
            mime_type: mime_type.into(),
            raw_object_key: raw_object_key.into(),
            output_prefix: output_prefix.into(),
            status: JobStatus::Queued,
            stage: Stage::Fast,
            progress: 0,
            per_resolution: BTreeMap::new(),
            attempts: 0,
            max_attempts: default_max_attempts(),
            hls_master_url: None,
            error: None,
            created_at: now,
            queued_at: Some(now),
            started_at: None,
            completed_at: None,
            failed_at: None,
            correlation_id: None,
            version: 0,
        }
    }

    /// Set the correlation ID.
    pub fn with_correlation_id(mut self, id: Option<String>) -> Self {
        self.correlation_id = id;
        self
    }

    /// Derive the sibling background-stage job for the same source video.
    /// A separate record so the two stages transition independently. The ID
    /// is derived from the fast job's ID, so a replayed fast completion
    /// collides on create instead of enqueueing a second sibling.
    pub fn background_sibling(&self) -> Self {
        let now = Utc::now();
        Self {
            job_id: JobId::from_string(format!("{}-bg", self.job_id)),
            original_filename: self.original_filename.clone(),
            original_size: self.original_size,
            mime_type: self.mime_type.clone(),
            raw_object_key: self.raw_object_key.clone(),
            output_prefix: self.output_prefix.clone(),
            status: JobStatus::Queued,
            stage: Stage::Background,
            progress: 0,
            per_resolution: BTreeMap::new(),
            attempts: 0,
            max_attempts: self.max_attempts,
            hls_master_url: self.hls_master_url.clone(),
            error: None,
            created_at: now,
            queued_at: Some(now),
            started_at: None,
            completed_at: None,
            failed_at: None,
            correlation_id: self.correlation_id.clone(),
            version: 0,
        }
    }

    /// Whether the record accepts further lifecycle events.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether a retry is currently allowed.
    pub fn can_retry(&self) -> bool {
        self.status == JobStatus::Failed && self.attempts < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> Job {
        Job::new(
            "sample.mp4",
            104_857_600,
            "video/mp4",
            "raw-videos/abc-sample.mp4",
            "abc-sample",
        )
    }

    #[test]
    fn new_job_is_queued_on_fast_lane() {
        let job = sample_job();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.stage, Stage::Fast);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_attempts, 3);
        assert!(job.queued_at.is_some());
    }

    #[test]
    fn background_sibling_shares_source_but_not_id() {
        let fast = sample_job();
        let bg = fast.background_sibling();
        assert_ne!(bg.job_id, fast.job_id);
        // Deterministic so a replayed fast completion cannot enqueue twice
        assert_eq!(bg.job_id.as_str(), format!("{}-bg", fast.job_id));
        assert_eq!(bg.job_id, fast.background_sibling().job_id);
        assert_eq!(bg.raw_object_key, fast.raw_object_key);
        assert_eq!(bg.output_prefix, fast.output_prefix);
        assert_eq!(bg.stage, Stage::Background);
        assert_eq!(bg.status, JobStatus::Queued);
        assert_eq!(bg.progress, 0);
    }

    #[test]
    fn stage_targets_cover_the_ladder() {
        let mut all = Stage::Fast.target_resolutions();
        all.extend(Stage::Background.target_resolutions());
        assert_eq!(all, Resolution::ALL.to_vec());
        assert_eq!(Stage::Background.playlist_resolutions(), Resolution::ALL.to_vec());
    }

    #[test]
    fn retry_requires_failed_with_budget() {
        let mut job = sample_job();
        assert!(!job.can_retry());

        job.status = JobStatus::Failed;
        job.attempts = 2;
        assert!(job.can_retry());

        job.attempts = 3;
        assert!(!job.can_retry());
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
    }

    #[test]
    fn serde_roundtrip() {
        let mut job = sample_job();
        job.per_resolution.insert(
            Resolution::R360p,
            RenditionProgress {
                status: RenditionState::Completed,
                progress: 100,
            },
        );
        let json = serde_json::to_string(&job).unwrap();
        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back.job_id, job.job_id);
        assert_eq!(back.per_resolution.len(), 1);
        assert_eq!(
            back.per_resolution[&Resolution::R360p].status,
            RenditionState::Completed
        );
    }
}
