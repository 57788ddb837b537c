//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage client: {0}")]
    ConfigError(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Authentication rejected: {0}")]
    AuthError(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("List failed: {0}")]
    ListFailed(String),

    #[error("Presign failed: {0}")]
    PresignFailed(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    /// Whether retrying the operation may succeed. Auth rejections and
    /// missing objects never do; network and 5xx classes may.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::Network(_)
                | StorageError::UploadFailed(_)
                | StorageError::DownloadFailed(_)
                | StorageError::ListFailed(_)
                | StorageError::Io(_)
        )
    }

    /// Classify an AWS SDK error by its rendered service code. The SDK's
    /// generic error types only expose codes as strings here, so the
    /// classification matches on those.
    pub fn classify_sdk(context: &str, rendered: String) -> Self {
        if rendered.contains("NoSuchKey") || rendered.contains("NotFound") {
            Self::NotFound(context.to_string())
        } else if rendered.contains("AccessDenied")
            || rendered.contains("InvalidAccessKeyId")
            || rendered.contains("SignatureDoesNotMatch")
            || rendered.contains("ExpiredToken")
        {
            Self::AuthError(rendered)
        } else {
            Self::Network(rendered)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_are_not_transient() {
        let err = StorageError::classify_sdk("k", "AccessDenied: nope".into());
        assert!(matches!(err, StorageError::AuthError(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn missing_objects_map_to_not_found() {
        let err = StorageError::classify_sdk("videos/a.mp4", "NoSuchKey".into());
        assert!(matches!(err, StorageError::NotFound(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn unknown_failures_are_transient_network_errors() {
        let err = StorageError::classify_sdk("k", "connection reset by peer".into());
        assert!(matches!(err, StorageError::Network(_)));
        assert!(err.is_transient());
    }
}
