//! Partial job updates.

use chrono::Utc;

use vodflow_models::{Job, JobError, JobStatus, RenditionProgress, Resolution};

/// A partial update applied to a job record inside the store's
/// compare-and-swap loop.
///
/// Application is idempotent for every field: progress and attempts are
/// taken as maxima, so an at-least-once event stream can safely replay.
/// `reset_progress` is the one deliberate exception, used when a stalled or
/// retried job restarts its stage from scratch.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub reset_progress: bool,
    pub attempts: Option<u32>,
    /// Administrative retry grants a fresh attempt budget
    pub reset_attempts: bool,
    pub hls_master_url: Option<String>,
    pub error: Option<JobError>,
    pub clear_error: bool,
    pub renditions: Vec<(Resolution, RenditionProgress)>,
}

impl JobPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    /// Restart stage-local progress from zero, bypassing monotonicity.
    pub fn restart_progress(mut self) -> Self {
        self.reset_progress = true;
        self
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    /// Zero the attempt counter (administrative retry).
    pub fn restart_attempts(mut self) -> Self {
        self.reset_attempts = true;
        self
    }

    pub fn hls_master_url(mut self, url: impl Into<String>) -> Self {
        self.hls_master_url = Some(url.into());
        self
    }

    pub fn error(mut self, error: JobError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.clear_error = true;
        self
    }

    pub fn rendition(mut self, resolution: Resolution, progress: RenditionProgress) -> Self {
        self.renditions.push((resolution, progress));
        self
    }

    /// Apply this patch to a job in place. Timestamps follow status
    /// transitions; terminal statuses force `progress` consistency.
    pub fn apply(&self, job: &mut Job) {
        let now = Utc::now();

        if self.reset_progress {
            job.progress = 0;
        }

        if let Some(progress) = self.progress {
            job.progress = job.progress.max(progress);
        }

        if self.reset_attempts {
            job.attempts = 0;
        }

        if let Some(attempts) = self.attempts {
            job.attempts = job.attempts.max(attempts);
        }

        if let Some(url) = &self.hls_master_url {
            job.hls_master_url = Some(url.clone());
        }

        if self.clear_error {
            job.error = None;
        }
        if let Some(error) = &self.error {
            job.error = Some(error.clone());
        }

        for (resolution, progress) in &self.renditions {
            job.per_resolution.insert(*resolution, *progress);
        }

        if let Some(status) = self.status {
            if job.status != status {
                match status {
                    JobStatus::Queued => job.queued_at = Some(now),
                    JobStatus::Processing => job.started_at = Some(now),
                    JobStatus::Completed => {
                        job.completed_at = Some(now);
                        job.progress = 100;
                    }
                    JobStatus::Failed => job.failed_at = Some(now),
                    JobStatus::Pending => {}
                }
            }
            job.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vodflow_models::RenditionState;

    fn sample_job() -> Job {
        Job::new(
            "sample.mp4",
            1024,
            "video/mp4",
            "raw-videos/x-sample.mp4",
            "x-sample",
        )
    }

    #[test]
    fn progress_is_monotonic() {
        let mut job = sample_job();
        JobPatch::new().progress(40).apply(&mut job);
        assert_eq!(job.progress, 40);

        // A replayed lower value is ignored
        JobPatch::new().progress(10).apply(&mut job);
        assert_eq!(job.progress, 40);
    }

    #[test]
    fn restart_resets_then_reapplies() {
        let mut job = sample_job();
        JobPatch::new().progress(70).apply(&mut job);

        JobPatch::new()
            .restart_progress()
            .status(JobStatus::Queued)
            .apply(&mut job);
        assert_eq!(job.progress, 0);
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[test]
    fn attempts_take_maximum() {
        let mut job = sample_job();
        JobPatch::new().attempts(2).apply(&mut job);
        JobPatch::new().attempts(1).apply(&mut job);
        assert_eq!(job.attempts, 2);
    }

    #[test]
    fn administrative_retry_resets_the_budget() {
        let mut job = sample_job();
        JobPatch::new()
            .status(JobStatus::Failed)
            .attempts(3)
            .apply(&mut job);

        JobPatch::new()
            .status(JobStatus::Queued)
            .restart_attempts()
            .restart_progress()
            .clear_error()
            .apply(&mut job);

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.progress, 0);
        assert!(job.error.is_none());
    }

    #[test]
    fn completion_sets_timestamp_and_progress() {
        let mut job = sample_job();
        JobPatch::new()
            .status(JobStatus::Completed)
            .hls_master_url("/api/upload/hls/x-sample/master.m3u8")
            .apply(&mut job);

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.completed_at.is_some());
        assert!(job.hls_master_url.is_some());
    }

    #[test]
    fn failure_records_error() {
        let mut job = sample_job();
        JobPatch::new()
            .status(JobStatus::Failed)
            .attempts(3)
            .error(JobError::new("EncoderError: 360p", Some("stderr tail".into())))
            .apply(&mut job);

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.failed_at.is_some());
        assert_eq!(job.error.as_ref().unwrap().message, "EncoderError: 360p");
    }

    #[test]
    fn rendition_updates_merge() {
        let mut job = sample_job();
        JobPatch::new()
            .rendition(
                Resolution::R360p,
                RenditionProgress {
                    status: RenditionState::Completed,
                    progress: 100,
                },
            )
            .apply(&mut job);

        assert_eq!(
            job.per_resolution[&Resolution::R360p].status,
            RenditionState::Completed
        );
    }

    #[test]
    fn replaying_identical_patch_is_idempotent() {
        let mut a = sample_job();
        let patch = JobPatch::new().status(JobStatus::Processing).progress(5);
        patch.apply(&mut a);
        let status_after_once = a.status;
        let progress_after_once = a.progress;

        patch.apply(&mut a);
        assert_eq!(a.status, status_after_once);
        assert_eq!(a.progress, progress_after_once);
    }
}
