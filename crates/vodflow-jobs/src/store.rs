//! Redis-backed job store with optimistic per-record updates.

use std::collections::HashMap;

use redis::Script;
use tracing::debug;

use vodflow_models::{Job, JobId, JobStatus};

use crate::error::{JobStoreError, JobStoreResult};
use crate::patch::JobPatch;

const KEY_PREFIX: &str = "vodflow:job:";
const CREATED_INDEX: &str = "vodflow:jobs:created";
const STATUS_PREFIX: &str = "vodflow:jobs:status:";

/// Attempts before an update gives up under CAS contention.
const CAS_RETRIES: u32 = 8;

const ALL_STATUSES: [JobStatus; 5] = [
    JobStatus::Pending,
    JobStatus::Queued,
    JobStatus::Processing,
    JobStatus::Completed,
    JobStatus::Failed,
];

/// Swap the record only when the version still matches, moving the status
/// index membership in the same step.
const CAS_SCRIPT: &str = r#"
local cur = redis.call('GET', KEYS[1])
if not cur then return -1 end
local decoded = cjson.decode(cur)
if tonumber(decoded['version']) ~= tonumber(ARGV[1]) then return 0 end
redis.call('SET', KEYS[1], ARGV[2])
if KEYS[2] ~= KEYS[3] then
  redis.call('SREM', KEYS[2], ARGV[3])
  redis.call('SADD', KEYS[3], ARGV[3])
end
return 1
"#;

/// Delete the record unless it is mid-processing.
const DELETE_SCRIPT: &str = r#"
local cur = redis.call('GET', KEYS[1])
if not cur then return -1 end
local decoded = cjson.decode(cur)
if decoded['status'] == 'processing' then return 0 end
redis.call('DEL', KEYS[1])
redis.call('ZREM', KEYS[2], ARGV[1])
redis.call('SREM', KEYS[3] .. decoded['status'], ARGV[1])
return 1
"#;

/// Job store configuration.
#[derive(Debug, Clone)]
pub struct JobStoreConfig {
    /// Redis connection URL
    pub redis_url: String,
}

impl JobStoreConfig {
    /// Create config from environment variables. `JOB_STORE_URL` wins over
    /// the shared `REDIS_URL`.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("JOB_STORE_URL")
                .or_else(|_| std::env::var("REDIS_URL"))
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
        }
    }
}

/// Listing filter.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub limit: usize,
    pub offset: usize,
}

/// Aggregate counts per status.
pub type StatusCounts = HashMap<JobStatus, u64>;

/// Durable record of each transcode job; the single source of truth for
/// user-visible state.
#[derive(Clone)]
pub struct JobStore {
    client: redis::Client,
}

impl JobStore {
    /// Create a new job store.
    pub fn new(config: JobStoreConfig) -> JobStoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client })
    }

    /// Create from environment variables.
    pub fn from_env() -> JobStoreResult<Self> {
        Self::new(JobStoreConfig::from_env())
    }

    fn job_key(id: &JobId) -> String {
        format!("{KEY_PREFIX}{id}")
    }

    fn status_key(status: JobStatus) -> String {
        format!("{STATUS_PREFIX}{}", status.as_str())
    }

    /// Persist a new job. Fails with `Conflict` when the ID already exists.
    pub async fn create(&self, job: &Job) -> JobStoreResult<Job> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let mut stored = job.clone();
        stored.version = 1;
        let payload = serde_json::to_string(&stored)?;

        let created: Option<String> = redis::cmd("SET")
            .arg(Self::job_key(&stored.job_id))
            .arg(&payload)
            .arg("NX")
            .query_async(&mut conn)
            .await?;

        if created.is_none() {
            return Err(JobStoreError::conflict(stored.job_id.to_string()));
        }

        redis::cmd("ZADD")
            .arg(CREATED_INDEX)
            .arg(stored.created_at.timestamp_millis())
            .arg(stored.job_id.as_str())
            .query_async::<()>(&mut conn)
            .await?;
        redis::cmd("SADD")
            .arg(Self::status_key(stored.status))
            .arg(stored.job_id.as_str())
            .query_async::<()>(&mut conn)
            .await?;

        debug!(job_id = %stored.job_id, "created job record");
        Ok(stored)
    }

    /// Fetch a job by ID.
    pub async fn get(&self, job_id: &JobId) -> JobStoreResult<Job> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload: Option<String> = redis::cmd("GET")
            .arg(Self::job_key(job_id))
            .query_async(&mut conn)
            .await?;

        match payload {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Err(JobStoreError::not_found(job_id.to_string())),
        }
    }

    /// Apply a patch under optimistic concurrency. With `expected_status`
    /// set, the update is a no-op failure (`Precondition`) when the job is
    /// in any other state at application time.
    pub async fn update(
        &self,
        job_id: &JobId,
        patch: &JobPatch,
        expected_status: Option<JobStatus>,
    ) -> JobStoreResult<Job> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let script = Script::new(CAS_SCRIPT);

        for _ in 0..CAS_RETRIES {
            let current = self.get(job_id).await?;

            if let Some(expected) = expected_status {
                if current.status != expected {
                    return Err(JobStoreError::precondition(format!(
                        "job {} is {}, expected {}",
                        job_id, current.status, expected
                    )));
                }
            }

            let mut updated = current.clone();
            patch.apply(&mut updated);
            updated.version = current.version + 1;

            let payload = serde_json::to_string(&updated)?;
            let swapped: i64 = script
                .key(Self::job_key(job_id))
                .key(Self::status_key(current.status))
                .key(Self::status_key(updated.status))
                .arg(current.version)
                .arg(&payload)
                .arg(job_id.as_str())
                .invoke_async(&mut conn)
                .await?;

            match swapped {
                1 => return Ok(updated),
                0 => continue,
                _ => return Err(JobStoreError::not_found(job_id.to_string())),
            }
        }

        Err(JobStoreError::Contention(job_id.to_string()))
    }

    /// List jobs newest-first, optionally filtered by status.
    /// Returns the page and the total matching count.
    pub async fn list(&self, filter: &JobFilter) -> JobStoreResult<(Vec<Job>, u64)> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let ids: Vec<String> = redis::cmd("ZREVRANGE")
            .arg(CREATED_INDEX)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;

        if ids.is_empty() {
            return Ok((Vec::new(), 0));
        }

        let keys: Vec<String> = ids
            .iter()
            .map(|id| format!("{KEY_PREFIX}{id}"))
            .collect();
        let payloads: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;

        let matching: Vec<Job> = payloads
            .into_iter()
            .flatten()
            .filter_map(|json| serde_json::from_str::<Job>(&json).ok())
            .filter(|job| filter.status.map_or(true, |s| job.status == s))
            .collect();

        let total = matching.len() as u64;
        let limit = if filter.limit == 0 { 50 } else { filter.limit };
        let page = matching
            .into_iter()
            .skip(filter.offset)
            .take(limit)
            .collect();

        Ok((page, total))
    }

    /// Aggregate job counts per status.
    pub async fn count_by_status(&self) -> JobStoreResult<StatusCounts> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let mut counts = StatusCounts::new();
        for status in ALL_STATUSES {
            let count: u64 = redis::cmd("SCARD")
                .arg(Self::status_key(status))
                .query_async(&mut conn)
                .await?;
            counts.insert(status, count);
        }
        Ok(counts)
    }

    /// Delete a job record. Refuses while the job is processing.
    pub async fn delete(&self, job_id: &JobId) -> JobStoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let script = Script::new(DELETE_SCRIPT);

        let result: i64 = script
            .key(Self::job_key(job_id))
            .key(CREATED_INDEX)
            .key(STATUS_PREFIX)
            .arg(job_id.as_str())
            .invoke_async(&mut conn)
            .await?;

        match result {
            1 => {
                debug!(job_id = %job_id, "deleted job record");
                Ok(())
            }
            0 => Err(JobStoreError::conflict(format!(
                "job {job_id} is processing and cannot be deleted"
            ))),
            _ => Err(JobStoreError::not_found(job_id.to_string())),
        }
    }
}
