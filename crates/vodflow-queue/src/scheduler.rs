//! Scheduler: queue operations plus job-store mirroring.
//!
//! Every lifecycle event the queue emits is reflected into the durable job
//! record here, in one place, through idempotent patches. Events are
//! delivered at least once; a replay or an event arriving after the job
//! reached a terminal state is simply skipped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use vodflow_jobs::{JobPatch, JobStore, JobStoreError};
use vodflow_models::{Job, JobError, JobId, JobStatus, QueueEvent};

use crate::backoff::retry_delay;
use crate::config::{LaneConfig, QueueName};
use crate::entry::{QueueEntry, QueuePayload};
use crate::error::QueueResult;
use crate::queue::{JobQueue, QueueStats, RetryOutcome, StallOutcome};

/// Scheduler facade over the two lanes.
#[derive(Clone)]
pub struct Scheduler {
    queue: Arc<JobQueue>,
    jobs: Arc<JobStore>,
}

impl Scheduler {
    pub fn new(queue: Arc<JobQueue>, jobs: Arc<JobStore>) -> Self {
        Self { queue, jobs }
    }

    /// The durable job store behind this scheduler.
    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    /// The raw queue, for stats.
    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn lane(&self, queue: QueueName) -> LaneConfig {
        LaneConfig::for_queue(queue)
    }

    fn payload_for(job: &Job) -> QueuePayload {
        QueuePayload {
            raw_object_key: job.raw_object_key.clone(),
            original_filename: job.original_filename.clone(),
            stage: job.stage,
            correlation_id: job.correlation_id.clone(),
            local_path: None,
        }
    }

    /// Persist a new job record and enqueue it on the given lane.
    pub async fn submit(&self, queue: QueueName, job: &Job) -> QueueResult<Job> {
        let created = self.jobs.create(job).await?;
        self.queue
            .enqueue(queue, &created.job_id, Self::payload_for(&created))
            .await?;
        self.apply_event(&created.job_id, QueueEvent::Added).await;
        Ok(created)
    }

    /// Re-enqueue an existing job (admission retry path). The job record
    /// must already be back in `queued`.
    pub async fn requeue(&self, queue: QueueName, job: &Job) -> QueueResult<()> {
        self.queue
            .enqueue(queue, &job.job_id, Self::payload_for(job))
            .await?;
        self.apply_event(&job.job_id, QueueEvent::Added).await;
        Ok(())
    }

    /// Claim the next entry on a lane, mirroring the `active` transition.
    pub async fn claim(
        &self,
        queue: QueueName,
        worker_id: &str,
        block: Duration,
    ) -> QueueResult<Option<QueueEntry>> {
        let lane = self.lane(queue);
        let Some(entry) = self.queue.claim(queue, &lane, worker_id, block).await? else {
            return Ok(None);
        };

        self.apply_event(
            &entry.job_id,
            QueueEvent::Active {
                attempts: entry.execution_number(),
            },
        )
        .await;

        Ok(Some(entry))
    }

    /// Renew the lock on a claimed entry.
    pub async fn heartbeat(&self, queue: QueueName, entry: &mut QueueEntry) -> QueueResult<()> {
        let lane = self.lane(queue);
        self.queue.heartbeat(queue, &lane, entry).await
    }

    /// Mirror stage-local progress.
    pub async fn progress(&self, job_id: &JobId, value: u8) {
        self.apply_event(job_id, QueueEvent::Progress { value })
            .await;
    }

    /// Complete an entry and mirror the terminal transition.
    pub async fn complete(
        &self,
        queue: QueueName,
        entry: &mut QueueEntry,
        hls_url: Option<String>,
    ) -> QueueResult<()> {
        let lane = self.lane(queue);
        self.queue.complete(queue, &lane, entry).await?;
        self.apply_event(&entry.job_id, QueueEvent::Completed { hls_url })
            .await;
        Ok(())
    }

    /// Count a failed execution: re-queue with exponential backoff, or fail
    /// permanently once the attempt budget is gone.
    pub async fn retry_or_fail(
        &self,
        queue: QueueName,
        entry: QueueEntry,
        reason: &str,
    ) -> QueueResult<RetryOutcome> {
        let lane = self.lane(queue);
        let delay = retry_delay(lane.backoff_base, entry.attempts_made + 1);
        let job_id = entry.job_id.clone();

        let outcome = self.queue.retry(queue, &lane, entry, delay).await?;
        match &outcome {
            RetryOutcome::Delayed(entry) => {
                // The worker already recorded the failure detail; put the
                // record back into queued for the next execution.
                let patch = JobPatch::new()
                    .status(JobStatus::Queued)
                    .restart_progress()
                    .attempts(entry.attempts_made);
                self.apply_patch(&job_id, patch, Some(JobStatus::Failed))
                    .await;
                info!(job_id = %job_id, delay_secs = delay.as_secs(), "job scheduled for retry");
            }
            RetryOutcome::Exhausted(_) => {
                self.apply_event(
                    &job_id,
                    QueueEvent::Failed {
                        reason: reason.to_string(),
                    },
                )
                .await;
            }
        }

        Ok(outcome)
    }

    /// Per-lane queue counts.
    pub async fn stats(&self, queue: QueueName) -> QueueResult<QueueStats> {
        self.queue.stats(queue).await
    }

    /// Run the stall sweeper for both lanes until shutdown. Expired locks
    /// return their entries to waiting; a second stall fails the entry.
    pub async fn run_stall_sweeper(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        // Sweep at the fast lane's cadence; the background lane's longer
        // interval only means some sweeps find nothing.
        let interval = QueueName::ALL
            .iter()
            .map(|q| LaneConfig::for_queue(*q).stall_check)
            .min()
            .unwrap_or(Duration::from_secs(30));
        let mut ticker = tokio::time::interval(interval);

        info!(interval_secs = interval.as_secs(), "stall sweeper running");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    for queue in QueueName::ALL {
                        match self.queue.sweep_stalled(queue).await {
                            Ok(outcomes) => {
                                for outcome in outcomes {
                                    match outcome {
                                        StallOutcome::Requeued(entry) => {
                                            self.apply_event(&entry.job_id, QueueEvent::Stalled).await;
                                        }
                                        StallOutcome::Failed(entry) => {
                                            self.apply_event(
                                                &entry.job_id,
                                                QueueEvent::Failed { reason: "stalled".into() },
                                            )
                                            .await;
                                        }
                                    }
                                }
                            }
                            Err(e) => warn!(queue = %queue, error = %e, "stall sweep failed"),
                        }
                    }
                }
            }
        }

        info!("stall sweeper stopped");
    }

    /// Mirror one lifecycle event into the job store. Best effort: the
    /// queue remains authoritative for scheduling, so mirror failures are
    /// logged rather than propagated.
    pub async fn apply_event(&self, job_id: &JobId, event: QueueEvent) {
        let current = match self.jobs.get(job_id).await {
            Ok(job) => job,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "cannot mirror event, job missing");
                return;
            }
        };

        // Terminal records accept no further lifecycle events; retries go
        // through their own explicit queued reset.
        if current.is_terminal() {
            debug!(job_id = %job_id, status = %current.status, ?event, "skipping event on terminal job");
            return;
        }

        let (patch, expected) = match event {
            QueueEvent::Added => (JobPatch::new().status(JobStatus::Queued), None),
            QueueEvent::Active { attempts } => (
                JobPatch::new()
                    .status(JobStatus::Processing)
                    .attempts(attempts),
                None,
            ),
            QueueEvent::Progress { value } => (
                JobPatch::new().progress(value),
                Some(JobStatus::Processing),
            ),
            QueueEvent::Completed { hls_url } => {
                let mut patch = JobPatch::new().status(JobStatus::Completed).progress(100);
                if let Some(url) = hls_url {
                    patch = patch.hls_master_url(url);
                }
                (patch, None)
            }
            QueueEvent::Failed { reason } => (
                JobPatch::new()
                    .status(JobStatus::Failed)
                    .error(JobError::new(reason, None)),
                None,
            ),
            QueueEvent::Stalled => (
                JobPatch::new()
                    .status(JobStatus::Queued)
                    .restart_progress(),
                Some(JobStatus::Processing),
            ),
        };

        self.apply_patch(job_id, patch, expected).await;
    }

    async fn apply_patch(
        &self,
        job_id: &JobId,
        patch: JobPatch,
        expected: Option<JobStatus>,
    ) {
        match self.jobs.update(job_id, &patch, expected).await {
            Ok(_) => {}
            Err(JobStoreError::Precondition(msg)) => {
                debug!(job_id = %job_id, msg, "event skipped by status precondition");
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "failed to mirror event into job store");
            }
        }
    }
}
