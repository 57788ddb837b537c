//! Worker error types.

use thiserror::Error;

use vodflow_media::MediaError;
use vodflow_models::JobError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Input missing: {0}")]
    InputMissing(String),

    #[error("Shutting down")]
    ShuttingDown,

    #[error("Storage error: {0}")]
    Storage(#[from] vodflow_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] vodflow_queue::QueueError),

    #[error("Job store error: {0}")]
    JobStore(#[from] vodflow_jobs::JobStoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    /// Whether the failure came from graceful shutdown rather than the job
    /// itself. Such entries keep their lock until the sweeper recovers them.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            WorkerError::ShuttingDown | WorkerError::Media(MediaError::Cancelled)
        )
    }

    /// Turn this failure into the durable error recorded on the job.
    /// Encoder failures keep their `EncoderError: {resolution}` shape and
    /// carry the stderr tail as detail.
    pub fn to_job_error(&self) -> JobError {
        match self {
            WorkerError::Media(
                media @ MediaError::EncoderFailed { stderr_tail, .. },
            ) => JobError::new(media.to_string(), Some(stderr_tail.clone())),
            other => JobError::new(other.to_string(), None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vodflow_models::Resolution;

    #[test]
    fn encoder_failures_keep_the_spec_error_shape() {
        let err = WorkerError::Media(MediaError::encoder_failed(
            Resolution::R360p,
            "x264 blew up",
            Some(1),
        ));
        let job_error = err.to_job_error();
        assert_eq!(job_error.message, "EncoderError: 360p");
        assert_eq!(job_error.detail.as_deref(), Some("x264 blew up"));
    }

    #[test]
    fn cancellation_detection() {
        assert!(WorkerError::ShuttingDown.is_cancellation());
        assert!(WorkerError::Media(MediaError::Cancelled).is_cancellation());
        assert!(!WorkerError::job_failed("boom").is_cancellation());
    }
}
