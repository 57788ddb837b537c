//! Redis-backed queue primitives.

use std::time::Duration;

use chrono::Utc;
use redis::Script;
use serde::Serialize;
use tracing::{debug, info, warn};

use vodflow_models::JobId;

use crate::config::{LaneConfig, QueueConfig, QueueName};
use crate::entry::{EntryState, QueueEntry, QueuePayload};
use crate::error::{QueueError, QueueResult};

/// Atomically move the first due entry from waiting to active, stamping the
/// lock expiry as the active-set score. The sweeper scans that score, so a
/// claimed entry is invisible to it until its lock runs out.
const CLAIM_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, 1)
if #due == 0 then return false end
redis.call('ZREM', KEYS[1], due[1])
redis.call('ZADD', KEYS[2], ARGV[2], due[1])
return due[1]
"#;

/// Outcome of a retry request.
#[derive(Debug)]
pub enum RetryOutcome {
    /// Re-queued with a backoff delay
    Delayed(QueueEntry),
    /// Attempt budget exhausted; entry moved to failed
    Exhausted(QueueEntry),
}

/// Outcome of one sweeper pass over an expired lock.
#[derive(Debug)]
pub enum StallOutcome {
    /// Returned to waiting for another worker
    Requeued(QueueEntry),
    /// Stalled twice; marked failed
    Failed(QueueEntry),
}

/// Waiting/active/finished counts for one lane.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Low-level two-lane queue client.
#[derive(Clone)]
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    fn waiting_key(queue: QueueName) -> String {
        format!("vodflow:q:{queue}:waiting")
    }

    fn active_key(queue: QueueName) -> String {
        format!("vodflow:q:{queue}:active")
    }

    fn entry_key(queue: QueueName, job_id: &JobId) -> String {
        format!("vodflow:q:{queue}:entry:{job_id}")
    }

    fn finished_key(queue: QueueName, state: EntryState) -> String {
        match state {
            EntryState::Completed => format!("vodflow:q:{queue}:completed"),
            _ => format!("vodflow:q:{queue}:failed"),
        }
    }

    fn rate_key(queue: QueueName, lane: &LaneConfig) -> String {
        let window = Utc::now().timestamp() / lane.rate_limit_window.as_secs() as i64;
        format!("vodflow:q:{queue}:started:{window}")
    }

    async fn conn(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    async fn load_entry(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        queue: QueueName,
        job_id: &JobId,
    ) -> QueueResult<Option<QueueEntry>> {
        let payload: Option<String> = redis::cmd("GET")
            .arg(Self::entry_key(queue, job_id))
            .query_async(conn)
            .await?;
        Ok(match payload {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        })
    }

    async fn save_entry(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        queue: QueueName,
        entry: &QueueEntry,
    ) -> QueueResult<()> {
        let payload = serde_json::to_string(entry)?;
        redis::cmd("SET")
            .arg(Self::entry_key(queue, &entry.job_id))
            .arg(payload)
            .query_async::<()>(&mut *conn)
            .await?;
        Ok(())
    }

    /// Fetch an entry for inspection.
    pub async fn get_entry(
        &self,
        queue: QueueName,
        job_id: &JobId,
    ) -> QueueResult<Option<QueueEntry>> {
        let mut conn = self.conn().await?;
        self.load_entry(&mut conn, queue, job_id).await
    }

    /// Add a job to a lane. Re-using a `job_id` whose entry finished
    /// replaces the old entry; an entry still waiting or active is
    /// rejected with `AlreadyQueued`.
    pub async fn enqueue(
        &self,
        queue: QueueName,
        job_id: &JobId,
        payload: QueuePayload,
    ) -> QueueResult<QueueEntry> {
        let mut conn = self.conn().await?;

        if let Some(existing) = self.load_entry(&mut conn, queue, job_id).await? {
            if !existing.state.is_terminal() {
                return Err(QueueError::already_queued(job_id.to_string()));
            }
            // Replace the finished entry and its finished-set membership.
            redis::cmd("ZREM")
                .arg(Self::finished_key(queue, existing.state))
                .arg(job_id.as_str())
                .query_async::<()>(&mut conn)
                .await?;
        }

        let entry = QueueEntry::new(job_id.clone(), payload);
        self.save_entry(&mut conn, queue, &entry).await?;

        redis::cmd("ZADD")
            .arg(Self::waiting_key(queue))
            .arg(entry.available_at.timestamp_millis())
            .arg(job_id.as_str())
            .query_async::<()>(&mut conn)
            .await?;

        info!(queue = %queue, job_id = %job_id, "enqueued entry");
        Ok(entry)
    }

    /// Claim the next due entry, polling cooperatively up to `block`.
    /// Returns `None` when nothing became claimable (or the lane's start
    /// rate is exhausted) within the window.
    pub async fn claim(
        &self,
        queue: QueueName,
        lane: &LaneConfig,
        worker_id: &str,
        block: Duration,
    ) -> QueueResult<Option<QueueEntry>> {
        let deadline = tokio::time::Instant::now() + block;

        loop {
            if let Some(entry) = self.try_claim(queue, lane, worker_id).await? {
                return Ok(Some(entry));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.config.claim_poll).await;
        }
    }

    async fn try_claim(
        &self,
        queue: QueueName,
        lane: &LaneConfig,
        worker_id: &str,
    ) -> QueueResult<Option<QueueEntry>> {
        let mut conn = self.conn().await?;

        // Rate limit: starts per fixed window per lane.
        let rate_key = Self::rate_key(queue, lane);
        let started: u32 = redis::cmd("GET")
            .arg(&rate_key)
            .query_async::<Option<u32>>(&mut conn)
            .await?
            .unwrap_or(0);
        if started >= lane.rate_limit_starts {
            return Ok(None);
        }

        let now = Utc::now();
        let lock_expires = now + chrono::Duration::from_std(lane.lock_duration).unwrap_or_default();

        let popped: Option<String> = Script::new(CLAIM_SCRIPT)
            .key(Self::waiting_key(queue))
            .key(Self::active_key(queue))
            .arg(now.timestamp_millis())
            .arg(lock_expires.timestamp_millis())
            .invoke_async(&mut conn)
            .await?;

        let Some(id) = popped else {
            return Ok(None);
        };
        let job_id = JobId::from_string(id);

        let Some(mut entry) = self.load_entry(&mut conn, queue, &job_id).await? else {
            // Entry record vanished (pruned); drop the orphaned member.
            warn!(queue = %queue, job_id = %job_id, "claimed entry without record, dropping");
            redis::cmd("ZREM")
                .arg(Self::active_key(queue))
                .arg(job_id.as_str())
                .query_async::<()>(&mut conn)
                .await?;
            return Ok(None);
        };

        entry.state = EntryState::Active;
        entry.lock_owner = Some(worker_id.to_string());
        entry.lock_expires_at = Some(lock_expires);
        self.save_entry(&mut conn, queue, &entry).await?;

        redis::cmd("INCR")
            .arg(&rate_key)
            .query_async::<()>(&mut conn)
            .await?;
        redis::cmd("EXPIRE")
            .arg(&rate_key)
            .arg(lane.rate_limit_window.as_secs())
            .query_async::<()>(&mut conn)
            .await?;

        debug!(queue = %queue, job_id = %entry.job_id, worker_id, "claimed entry");
        Ok(Some(entry))
    }

    /// Renew the lock on an active entry. Fails with `LockLost` when the
    /// entry was swept or claimed by someone else meanwhile.
    pub async fn heartbeat(
        &self,
        queue: QueueName,
        lane: &LaneConfig,
        entry: &mut QueueEntry,
    ) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        let current = self
            .load_entry(&mut conn, queue, &entry.job_id)
            .await?
            .ok_or_else(|| QueueError::LockLost(entry.job_id.to_string()))?;

        if current.state != EntryState::Active || current.lock_owner != entry.lock_owner {
            return Err(QueueError::LockLost(entry.job_id.to_string()));
        }

        let lock_expires =
            Utc::now() + chrono::Duration::from_std(lane.lock_duration).unwrap_or_default();
        entry.lock_expires_at = Some(lock_expires);
        self.save_entry(&mut conn, queue, entry).await?;

        redis::cmd("ZADD")
            .arg(Self::active_key(queue))
            .arg("XX")
            .arg(lock_expires.timestamp_millis())
            .arg(entry.job_id.as_str())
            .query_async::<()>(&mut conn)
            .await?;

        Ok(())
    }

    /// Release the lock and mark the entry completed.
    pub async fn complete(
        &self,
        queue: QueueName,
        lane: &LaneConfig,
        entry: &mut QueueEntry,
    ) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        redis::cmd("ZREM")
            .arg(Self::active_key(queue))
            .arg(entry.job_id.as_str())
            .query_async::<()>(&mut conn)
            .await?;

        entry.state = EntryState::Completed;
        entry.unlock();
        self.save_entry(&mut conn, queue, entry).await?;

        redis::cmd("ZADD")
            .arg(Self::finished_key(queue, EntryState::Completed))
            .arg(Utc::now().timestamp_millis())
            .arg(entry.job_id.as_str())
            .query_async::<()>(&mut conn)
            .await?;

        self.trim_completed(&mut conn, queue, lane).await?;

        info!(queue = %queue, job_id = %entry.job_id, "entry completed");
        Ok(())
    }

    /// Release the lock and mark the entry permanently failed.
    /// Failed entries are kept for inspection.
    pub async fn fail(&self, queue: QueueName, entry: &mut QueueEntry) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        redis::cmd("ZREM")
            .arg(Self::active_key(queue))
            .arg(entry.job_id.as_str())
            .query_async::<()>(&mut conn)
            .await?;

        entry.state = EntryState::Failed;
        entry.unlock();
        self.save_entry(&mut conn, queue, entry).await?;

        redis::cmd("ZADD")
            .arg(Self::finished_key(queue, EntryState::Failed))
            .arg(Utc::now().timestamp_millis())
            .arg(entry.job_id.as_str())
            .query_async::<()>(&mut conn)
            .await?;

        warn!(queue = %queue, job_id = %entry.job_id, "entry failed");
        Ok(())
    }

    /// Count this execution as failed and re-queue with a delay, unless the
    /// attempt budget is exhausted.
    pub async fn retry(
        &self,
        queue: QueueName,
        lane: &LaneConfig,
        mut entry: QueueEntry,
        delay: Duration,
    ) -> QueueResult<RetryOutcome> {
        entry.attempts_made += 1;

        if entry.attempts_made >= lane.max_attempts {
            self.fail(queue, &mut entry).await?;
            return Ok(RetryOutcome::Exhausted(entry));
        }

        let mut conn = self.conn().await?;

        redis::cmd("ZREM")
            .arg(Self::active_key(queue))
            .arg(entry.job_id.as_str())
            .query_async::<()>(&mut conn)
            .await?;

        entry.state = EntryState::Waiting;
        entry.unlock();
        entry.available_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
        self.save_entry(&mut conn, queue, &entry).await?;

        redis::cmd("ZADD")
            .arg(Self::waiting_key(queue))
            .arg(entry.available_at.timestamp_millis())
            .arg(entry.job_id.as_str())
            .query_async::<()>(&mut conn)
            .await?;

        info!(
            queue = %queue,
            job_id = %entry.job_id,
            attempts_made = entry.attempts_made,
            delay_secs = delay.as_secs(),
            "entry re-queued for retry"
        );
        Ok(RetryOutcome::Delayed(entry))
    }

    /// Return every entry whose lock expired without heartbeat to the
    /// waiting set; an entry stalling for the second time fails instead.
    pub async fn sweep_stalled(&self, queue: QueueName) -> QueueResult<Vec<StallOutcome>> {
        let mut conn = self.conn().await?;
        let now_ms = Utc::now().timestamp_millis();

        let expired: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(Self::active_key(queue))
            .arg("-inf")
            .arg(now_ms)
            .query_async(&mut conn)
            .await?;

        let mut outcomes = Vec::new();

        for id in expired {
            let job_id = JobId::from_string(id);

            redis::cmd("ZREM")
                .arg(Self::active_key(queue))
                .arg(job_id.as_str())
                .query_async::<()>(&mut conn)
                .await?;

            let Some(mut entry) = self.load_entry(&mut conn, queue, &job_id).await? else {
                continue;
            };

            entry.stalls += 1;
            // The lost execution counts against the attempt budget.
            entry.attempts_made += 1;
            entry.unlock();

            if entry.stalls >= 2 {
                entry.state = EntryState::Failed;
                self.save_entry(&mut conn, queue, &entry).await?;
                redis::cmd("ZADD")
                    .arg(Self::finished_key(queue, EntryState::Failed))
                    .arg(now_ms)
                    .arg(entry.job_id.as_str())
                    .query_async::<()>(&mut conn)
                    .await?;
                warn!(queue = %queue, job_id = %entry.job_id, "entry stalled twice, failing");
                outcomes.push(StallOutcome::Failed(entry));
            } else {
                entry.state = EntryState::Waiting;
                entry.available_at = Utc::now();
                self.save_entry(&mut conn, queue, &entry).await?;
                redis::cmd("ZADD")
                    .arg(Self::waiting_key(queue))
                    .arg(entry.available_at.timestamp_millis())
                    .arg(entry.job_id.as_str())
                    .query_async::<()>(&mut conn)
                    .await?;
                warn!(queue = %queue, job_id = %entry.job_id, "stalled entry returned to waiting");
                outcomes.push(StallOutcome::Requeued(entry));
            }
        }

        Ok(outcomes)
    }

    /// Per-lane entry counts.
    pub async fn stats(&self, queue: QueueName) -> QueueResult<QueueStats> {
        let mut conn = self.conn().await?;

        let waiting: u64 = redis::cmd("ZCARD")
            .arg(Self::waiting_key(queue))
            .query_async(&mut conn)
            .await?;
        let active: u64 = redis::cmd("ZCARD")
            .arg(Self::active_key(queue))
            .query_async(&mut conn)
            .await?;
        let completed: u64 = redis::cmd("ZCARD")
            .arg(Self::finished_key(queue, EntryState::Completed))
            .query_async(&mut conn)
            .await?;
        let failed: u64 = redis::cmd("ZCARD")
            .arg(Self::finished_key(queue, EntryState::Failed))
            .query_async(&mut conn)
            .await?;

        Ok(QueueStats {
            waiting,
            active,
            completed,
            failed,
        })
    }

    /// Prune completed entries by age and count.
    async fn trim_completed(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        queue: QueueName,
        lane: &LaneConfig,
    ) -> QueueResult<()> {
        let completed_key = Self::finished_key(queue, EntryState::Completed);
        let cutoff_ms = (Utc::now()
            - chrono::Duration::from_std(lane.remove_completed_after).unwrap_or_default())
        .timestamp_millis();

        let aged: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&completed_key)
            .arg("-inf")
            .arg(cutoff_ms)
            .query_async(&mut *conn)
            .await?;

        let total: i64 = redis::cmd("ZCARD")
            .arg(&completed_key)
            .query_async(&mut *conn)
            .await?;
        let over_count = (total - lane.keep_completed as i64).max(0);
        let oldest: Vec<String> = if over_count > 0 {
            redis::cmd("ZRANGE")
                .arg(&completed_key)
                .arg(0)
                .arg(over_count - 1)
                .query_async(&mut *conn)
                .await?
        } else {
            Vec::new()
        };

        for id in aged.into_iter().chain(oldest) {
            redis::cmd("ZREM")
                .arg(&completed_key)
                .arg(&id)
                .query_async::<()>(&mut *conn)
                .await?;
            redis::cmd("DEL")
                .arg(Self::entry_key(queue, &JobId::from_string(id)))
                .query_async::<()>(&mut *conn)
                .await?;
        }

        Ok(())
    }
}
