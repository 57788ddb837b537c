//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Entry already queued: {0}")]
    AlreadyQueued(String),

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Lock lost for entry {0}")]
    LockLost(String),

    #[error("Job store error: {0}")]
    JobStore(#[from] vodflow_jobs::JobStoreError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn already_queued(id: impl Into<String>) -> Self {
        Self::AlreadyQueued(id.into())
    }

    pub fn entry_not_found(id: impl Into<String>) -> Self {
        Self::EntryNotFound(id.into())
    }
}
