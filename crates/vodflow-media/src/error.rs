//! Error types for encoder operations.

use thiserror::Error;
use vodflow_models::Resolution;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while driving the external encoder.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("ffmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("ffprobe not found in PATH")]
    FfprobeNotFound,

    #[error("EncoderError: {resolution}")]
    EncoderFailed {
        resolution: Resolution,
        /// Last portion of the encoder's stderr, for diagnostics
        stderr_tail: String,
        exit_code: Option<i32>,
    },

    #[error("ffprobe failed: {0}")]
    ProbeFailed(String),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Encoder produced no output for {0}")]
    MissingOutput(Resolution),

    /// Raw subprocess failure, before the driver attributes it to a
    /// resolution.
    #[error("encoder exited with status {exit_code:?}")]
    CommandFailed {
        stderr_tail: String,
        exit_code: Option<i32>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Encoder stalled: no progress for {0} seconds")]
    Stalled(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create an encoder failure for one resolution, keeping only a short
    /// stderr tail.
    pub fn encoder_failed(
        resolution: Resolution,
        stderr: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        let stderr = stderr.into();
        let tail_start = stderr.len().saturating_sub(2048);
        // Slice at a char boundary near the tail start.
        let tail_start = (tail_start..stderr.len())
            .find(|&i| stderr.is_char_boundary(i))
            .unwrap_or(stderr.len());
        Self::EncoderFailed {
            resolution,
            stderr_tail: stderr[tail_start..].to_string(),
            exit_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_error_message_names_resolution() {
        let err = MediaError::encoder_failed(Resolution::R360p, "boom", Some(1));
        assert_eq!(err.to_string(), "EncoderError: 360p");
    }

    #[test]
    fn stderr_tail_is_bounded() {
        let long = "x".repeat(10_000);
        let err = MediaError::encoder_failed(Resolution::R720p, long, Some(1));
        match err {
            MediaError::EncoderFailed { stderr_tail, .. } => {
                assert_eq!(stderr_tail.len(), 2048);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
