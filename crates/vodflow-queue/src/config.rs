//! Queue configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The two scheduling lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    /// Time-to-first-playback lane: 360p only, short locks
    Fast,
    /// HD lane: long locks, capped CPU
    Background,
}

impl QueueName {
    pub const ALL: [QueueName; 2] = [QueueName::Fast, QueueName::Background];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Fast => "fast",
            QueueName::Background => "background",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-lane scheduling parameters.
#[derive(Debug, Clone)]
pub struct LaneConfig {
    /// How long a claim's lock lasts without renewal
    pub lock_duration: Duration,
    /// Heartbeat interval for lock renewal
    pub lock_renew: Duration,
    /// How often the sweeper scans for expired locks
    pub stall_check: Duration,
    /// Total executions before the entry fails permanently
    pub max_attempts: u32,
    /// Base for the exponential retry backoff
    pub backoff_base: Duration,
    /// Claims allowed to start per rate window
    pub rate_limit_starts: u32,
    /// Rate limit window length
    pub rate_limit_window: Duration,
    /// Completed entries older than this are pruned
    pub remove_completed_after: Duration,
    /// Completed entries kept at most, newest first
    pub keep_completed: usize,
}

impl LaneConfig {
    /// Fast lane: short locks, frequent stall checks.
    pub fn fast() -> Self {
        Self {
            lock_duration: Duration::from_secs(60),
            lock_renew: Duration::from_secs(30),
            stall_check: Duration::from_secs(30),
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
            rate_limit_starts: 10,
            rate_limit_window: Duration::from_secs(60),
            remove_completed_after: Duration::from_secs(24 * 3600),
            keep_completed: 100,
        }
    }

    /// Background lane: HD encodes hold locks for minutes.
    pub fn background() -> Self {
        Self {
            lock_duration: Duration::from_secs(600),
            lock_renew: Duration::from_secs(300),
            stall_check: Duration::from_secs(60),
            ..Self::fast()
        }
    }

    pub fn for_queue(queue: QueueName) -> Self {
        match queue {
            QueueName::Fast => Self::fast(),
            QueueName::Background => Self::background(),
        }
    }
}

/// Queue backend configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis connection URL
    pub redis_url: String,
    /// Cooperative claim poll interval
    pub claim_poll: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            claim_poll: Duration::from_millis(250),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables. `QUEUE_URL` wins over the
    /// shared `REDIS_URL`.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("QUEUE_URL")
                .or_else(|_| std::env::var("REDIS_URL"))
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            claim_poll: Duration::from_millis(
                std::env::var("QUEUE_CLAIM_POLL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(250),
            ),
        }
    }
}
