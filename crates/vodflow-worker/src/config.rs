//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Worker process configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Workers bound to the fast lane
    pub fast_concurrency: usize,
    /// Workers bound to the background lane
    pub background_concurrency: usize,
    /// Thread cap for background encodes (fast encodes are unrestricted)
    pub background_threads: u32,
    /// Public base URL used when building playable HLS URLs
    pub api_base_url: String,
    /// Root for per-job scoped temp directories
    pub temp_root: PathBuf,
    /// How long one claim call blocks before polling again
    pub claim_block: Duration,
    /// Grace period for in-flight jobs on shutdown
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            fast_concurrency: 1,
            background_concurrency: 1,
            background_threads: 2,
            api_base_url: "http://localhost:8000/api/upload".to_string(),
            temp_root: std::env::temp_dir(),
            claim_block: Duration::from_secs(2),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            fast_concurrency: std::env::var("WORKER_FAST_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.fast_concurrency),
            background_concurrency: std::env::var("WORKER_BACKGROUND_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.background_concurrency),
            background_threads: std::env::var("WORKER_BACKGROUND_THREADS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.background_threads),
            api_base_url: std::env::var("API_BASE_URL")
                .unwrap_or(defaults.api_base_url)
                .trim_end_matches('/')
                .to_string(),
            temp_root: std::env::var("WORKER_TEMP_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_root),
            claim_block: Duration::from_secs(
                std::env::var("WORKER_CLAIM_BLOCK_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}
