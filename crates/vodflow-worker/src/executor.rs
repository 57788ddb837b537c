//! Worker pool: claim loops, heartbeats and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use vodflow_jobs::JobPatch;
use vodflow_models::JobStatus;
use vodflow_queue::{QueueEntry, QueueName, RetryOutcome, Scheduler};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::processor::{process_entry, ProcessContext};

/// Hosts the lane-bound workers of one process.
pub struct WorkerPool {
    ctx: ProcessContext,
    shutdown_tx: watch::Sender<bool>,
}

impl WorkerPool {
    pub fn new(ctx: ProcessContext, shutdown_tx: watch::Sender<bool>) -> Self {
        Self { ctx, shutdown_tx }
    }

    /// Signal shutdown: workers refuse new claims and drain in-flight jobs.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Run until shutdown. Spawns the configured number of workers per lane
    /// plus the stall sweeper.
    pub async fn run(&self) -> WorkerResult<()> {
        let config = &self.ctx.config;
        info!(
            fast = config.fast_concurrency,
            background = config.background_concurrency,
            "starting worker pool"
        );

        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        let sweeper = Arc::new(self.ctx.scheduler.clone());
        handles.push(tokio::spawn(
            sweeper.run_stall_sweeper(self.ctx.shutdown.clone()),
        ));

        for n in 0..config.fast_concurrency {
            handles.push(self.spawn_worker(QueueName::Fast, n));
        }
        for n in 0..config.background_concurrency {
            handles.push(self.spawn_worker(QueueName::Background, n));
        }

        // Wait for the shutdown signal, then give workers the grace period.
        let mut shutdown_rx = self.ctx.shutdown.clone();
        while !*shutdown_rx.borrow() {
            if shutdown_rx.changed().await.is_err() {
                break;
            }
        }

        info!("draining in-flight jobs");
        let drain = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(config.shutdown_timeout, drain)
            .await
            .is_err()
        {
            // Remaining locks expire and the sweeper returns the entries
            // to waiting.
            warn!("shutdown timeout reached with jobs still in flight");
        }

        info!("worker pool stopped");
        Ok(())
    }

    fn spawn_worker(&self, queue: QueueName, index: usize) -> JoinHandle<()> {
        let ctx = self.ctx.clone();
        let worker_id = format!("{queue}-worker-{index}-{}", Uuid::new_v4());

        tokio::spawn(async move {
            info!(worker_id, queue = %queue, "worker started");
            let mut shutdown_rx = ctx.shutdown.clone();

            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                let claimed = tokio::select! {
                    _ = shutdown_rx.changed() => continue,
                    claimed = ctx.scheduler.claim(queue, &worker_id, ctx.config.claim_block) => claimed,
                };

                match claimed {
                    Ok(Some(entry)) => {
                        execute_entry(&ctx, queue, entry).await;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!(worker_id, error = %e, "claim failed, backing off");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }

            info!(worker_id, "worker stopped");
        })
    }
}

/// Process one claimed entry with lock heartbeats, then settle the outcome
/// with the scheduler.
async fn execute_entry(ctx: &ProcessContext, queue: QueueName, mut entry: QueueEntry) {
    let log = JobLogger::new(&entry.job_id, entry.payload.stage.as_str());

    let heartbeat = spawn_heartbeat(ctx, queue, entry.clone());
    let result = process_entry(ctx, &entry).await;
    heartbeat.abort();

    match result {
        Ok(hls_url) => {
            if let Err(e) = ctx
                .scheduler
                .complete(queue, &mut entry, Some(hls_url))
                .await
            {
                log.failure(&format!("failed to complete entry: {e}"));
            }
        }
        Err(e) if e.is_cancellation() => {
            // Keep the lock; it expires and the sweeper returns the entry
            // to waiting for another worker.
            log.step("processing interrupted by shutdown, releasing to sweeper");
        }
        Err(e) => {
            log.failure(&format!("processing failed: {e}"));
            record_failure(ctx, queue, entry, &e, &log).await;
        }
    }
}

/// Mark the job failed and hand the entry to the retry path.
async fn record_failure(
    ctx: &ProcessContext,
    queue: QueueName,
    entry: QueueEntry,
    error: &WorkerError,
    log: &JobLogger,
) {
    let job_id = entry.job_id.clone();
    let job_error = error.to_job_error();

    let patch = JobPatch::new()
        .status(JobStatus::Failed)
        .attempts(entry.execution_number())
        .error(job_error.clone());
    if let Err(e) = ctx.scheduler.jobs().update(&job_id, &patch, None).await {
        log.warning(&format!("failed to record job failure: {e}"));
    }

    match ctx
        .scheduler
        .retry_or_fail(queue, entry, &job_error.message)
        .await
    {
        Ok(RetryOutcome::Delayed(entry)) => {
            log.step(&format!(
                "job will be retried (attempts made: {})",
                entry.attempts_made
            ));
        }
        Ok(RetryOutcome::Exhausted(_)) => {
            log.warning("attempt budget exhausted, job failed permanently");
        }
        Err(e) => {
            log.failure(&format!("retry bookkeeping failed: {e}"));
        }
    }
}

/// Renew the entry's lock until aborted.
fn spawn_heartbeat(ctx: &ProcessContext, queue: QueueName, mut entry: QueueEntry) -> JoinHandle<()> {
    let scheduler = ctx.scheduler.clone();
    let lane = scheduler.lane(queue);
    let log = JobLogger::new(&entry.job_id, entry.payload.stage.as_str());

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(lane.lock_renew);
        ticker.tick().await; // first tick fires immediately

        loop {
            ticker.tick().await;
            if let Err(e) = scheduler.heartbeat(queue, &mut entry).await {
                log.warning(&format!("heartbeat failed: {e}"));
                break;
            }
        }
    })
}
