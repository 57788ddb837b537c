//! Queue/scheduler integration tests.

use std::sync::Arc;
use std::time::Duration;

use vodflow_jobs::JobStore;
use vodflow_models::{Job, JobStatus, Stage};
use vodflow_queue::{
    JobQueue, LaneConfig, QueueError, QueueName, QueuePayload, RetryOutcome, Scheduler,
};

fn sample_job() -> Job {
    Job::new(
        "sample.mp4",
        104_857_600,
        "video/mp4",
        "raw-videos/qit-sample.mp4",
        "qit-sample",
    )
}

fn payload(stage: Stage) -> QueuePayload {
    QueuePayload {
        raw_object_key: "raw-videos/qit-sample.mp4".into(),
        original_filename: "sample.mp4".into(),
        stage,
        correlation_id: None,
        local_path: None,
    }
}

fn scheduler() -> Scheduler {
    dotenvy::dotenv().ok();
    let queue = Arc::new(JobQueue::from_env().expect("queue"));
    let jobs = Arc::new(JobStore::from_env().expect("job store"));
    Scheduler::new(queue, jobs)
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn enqueue_claim_complete_cycle() {
    let scheduler = scheduler();
    let job = sample_job();

    scheduler
        .submit(QueueName::Fast, &job)
        .await
        .expect("submit");

    let mut entry = scheduler
        .claim(QueueName::Fast, "test-worker", Duration::from_secs(2))
        .await
        .expect("claim")
        .expect("an entry should be claimable");
    assert_eq!(entry.job_id, job.job_id);

    // The active event mirrors into the job record.
    let mirrored = scheduler.jobs().get(&job.job_id).await.expect("get");
    assert_eq!(mirrored.status, JobStatus::Processing);
    assert_eq!(mirrored.attempts, 1);

    scheduler.heartbeat(QueueName::Fast, &mut entry).await.expect("heartbeat");

    scheduler
        .complete(
            QueueName::Fast,
            &mut entry,
            Some("/api/upload/hls/qit-sample/master.m3u8".into()),
        )
        .await
        .expect("complete");

    let done = scheduler.jobs().get(&job.job_id).await.expect("get");
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress, 100);
    assert!(done.hls_master_url.is_some());

    // Replaying completion events must not change anything (at-least-once).
    scheduler
        .apply_event(
            &job.job_id,
            vodflow_models::QueueEvent::Progress { value: 10 },
        )
        .await;
    let after_replay = scheduler.jobs().get(&job.job_id).await.expect("get");
    assert_eq!(after_replay.progress, 100);

    scheduler.jobs().delete(&job.job_id).await.expect("delete");
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn double_enqueue_of_active_entry_is_rejected() {
    let scheduler = scheduler();
    let job = sample_job();

    scheduler
        .submit(QueueName::Background, &job)
        .await
        .expect("submit");

    let result = scheduler
        .queue()
        .enqueue(QueueName::Background, &job.job_id, payload(Stage::Background))
        .await;
    assert!(matches!(result, Err(QueueError::AlreadyQueued(_))));

    // Drain to leave the queue clean.
    let mut entry = scheduler
        .claim(QueueName::Background, "test-worker", Duration::from_secs(2))
        .await
        .expect("claim")
        .expect("entry");
    scheduler
        .complete(QueueName::Background, &mut entry, None)
        .await
        .expect("complete");
    scheduler.jobs().delete(&job.job_id).await.expect("delete");
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn retry_exhaustion_fails_the_job() {
    let scheduler = scheduler();
    let lane = LaneConfig::fast();
    let job = sample_job();

    scheduler
        .submit(QueueName::Fast, &job)
        .await
        .expect("submit");

    // Exhaust the attempt budget through the retry path.
    let mut last_outcome = None;
    for _ in 0..lane.max_attempts {
        let entry = scheduler
            .claim(QueueName::Fast, "test-worker", Duration::from_secs(30))
            .await
            .expect("claim")
            .expect("entry");

        // Worker records its failure before asking for a retry.
        scheduler
            .jobs()
            .update(
                &job.job_id,
                &vodflow_jobs::JobPatch::new()
                    .status(JobStatus::Failed)
                    .attempts(entry.execution_number()),
                None,
            )
            .await
            .expect("record failure");

        last_outcome = Some(
            scheduler
                .retry_or_fail(QueueName::Fast, entry, "EncoderError: 360p")
                .await
                .expect("retry"),
        );

        // Backoff delays subsequent claims; wait it out.
        tokio::time::sleep(Duration::from_secs(9)).await;
    }

    assert!(matches!(last_outcome, Some(RetryOutcome::Exhausted(_))));

    let failed = scheduler.jobs().get(&job.job_id).await.expect("get");
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.attempts, lane.max_attempts);

    scheduler.jobs().delete(&job.job_id).await.expect("delete");
}
