//! Queue entries and payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vodflow_models::{JobId, Stage};

/// Work description carried by a queue entry. Everything the worker needs
/// besides the durable job record itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePayload {
    /// Object-store key of the source video
    pub raw_object_key: String,
    /// Original upload filename
    pub original_filename: String,
    /// Which lane's encode spec to run
    pub stage: Stage,
    /// Opaque external identifier for webhook notification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Local file produced by an adjacent ingest component; skips the
    /// object-store download when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
}

/// Queue-internal entry state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Ready (or due) for a claim
    #[default]
    Waiting,
    /// Claimed and locked by a worker
    Active,
    /// Backoff delay before returning to waiting
    Delayed,
    Completed,
    Failed,
}

impl EntryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryState::Completed | EntryState::Failed)
    }
}

/// Ephemeral queue entry, owned by the queue. The entry identifier equals
/// the durable job's `job_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub job_id: JobId,
    pub payload: QueuePayload,
    /// Completed executions that ended in failure or stall
    #[serde(default)]
    pub attempts_made: u32,
    /// Lock expiries observed without heartbeat
    #[serde(default)]
    pub stalls: u32,
    #[serde(default)]
    pub state: EntryState,
    /// When the entry becomes claimable
    pub available_at: DateTime<Utc>,
    /// Worker holding the lock
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_expires_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    pub fn new(job_id: JobId, payload: QueuePayload) -> Self {
        Self {
            job_id,
            payload,
            attempts_made: 0,
            stalls: 0,
            state: EntryState::Waiting,
            available_at: Utc::now(),
            lock_owner: None,
            lock_expires_at: None,
        }
    }

    /// The execution number a claim of this entry represents (1-based).
    pub fn execution_number(&self) -> u32 {
        self.attempts_made + 1
    }

    /// Release the lock fields.
    pub fn unlock(&mut self) {
        self.lock_owner = None;
        self.lock_expires_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> QueueEntry {
        QueueEntry::new(
            JobId::new(),
            QueuePayload {
                raw_object_key: "raw-videos/a-b.mp4".into(),
                original_filename: "b.mp4".into(),
                stage: Stage::Fast,
                correlation_id: None,
                local_path: None,
            },
        )
    }

    #[test]
    fn new_entry_is_waiting_and_unlocked() {
        let entry = sample_entry();
        assert_eq!(entry.state, EntryState::Waiting);
        assert_eq!(entry.execution_number(), 1);
        assert!(entry.lock_owner.is_none());
    }

    #[test]
    fn terminal_states() {
        assert!(EntryState::Completed.is_terminal());
        assert!(EntryState::Failed.is_terminal());
        assert!(!EntryState::Waiting.is_terminal());
        assert!(!EntryState::Active.is_terminal());
        assert!(!EntryState::Delayed.is_terminal());
    }

    #[test]
    fn serde_roundtrip_without_optional_fields() {
        let entry = sample_entry();
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("lock_owner"));
        let back: QueueEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.job_id, entry.job_id);
        assert_eq!(back.payload, entry.payload);
    }
}
