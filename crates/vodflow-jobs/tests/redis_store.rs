//! Job store integration tests.

use vodflow_jobs::{JobFilter, JobPatch, JobStore};
use vodflow_models::{Job, JobStatus};

fn sample_job() -> Job {
    Job::new(
        "sample.mp4",
        104_857_600,
        "video/mp4",
        "raw-videos/it-sample.mp4",
        "it-sample",
    )
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn create_get_roundtrip() {
    dotenvy::dotenv().ok();
    let store = JobStore::from_env().expect("create store");

    let job = sample_job();
    let created = store.create(&job).await.expect("create");
    assert_eq!(created.version, 1);

    let fetched = store.get(&job.job_id).await.expect("get");
    assert_eq!(fetched.job_id, job.job_id);
    assert_eq!(fetched.status, JobStatus::Queued);

    store.delete(&job.job_id).await.expect("delete");
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn duplicate_create_conflicts() {
    dotenvy::dotenv().ok();
    let store = JobStore::from_env().expect("create store");

    let job = sample_job();
    store.create(&job).await.expect("first create");
    let second = store.create(&job).await;
    assert!(second.is_err(), "duplicate create must fail");

    store.delete(&job.job_id).await.expect("delete");
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn update_with_wrong_expected_status_is_a_noop() {
    dotenvy::dotenv().ok();
    let store = JobStore::from_env().expect("create store");

    let job = sample_job();
    store.create(&job).await.expect("create");

    // Job is queued; expecting failed must not apply anything.
    let result = store
        .update(
            &job.job_id,
            &JobPatch::new().status(JobStatus::Processing),
            Some(JobStatus::Failed),
        )
        .await;
    assert!(result.is_err());

    let fetched = store.get(&job.job_id).await.expect("get");
    assert_eq!(fetched.status, JobStatus::Queued);

    store.delete(&job.job_id).await.expect("delete");
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn delete_refuses_processing_jobs() {
    dotenvy::dotenv().ok();
    let store = JobStore::from_env().expect("create store");

    let job = sample_job();
    store.create(&job).await.expect("create");
    store
        .update(
            &job.job_id,
            &JobPatch::new().status(JobStatus::Processing),
            None,
        )
        .await
        .expect("update");

    assert!(store.delete(&job.job_id).await.is_err());

    // Completion unlocks deletion.
    store
        .update(
            &job.job_id,
            &JobPatch::new().status(JobStatus::Completed),
            None,
        )
        .await
        .expect("update");
    store.delete(&job.job_id).await.expect("delete");
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn list_is_newest_first() {
    dotenvy::dotenv().ok();
    let store = JobStore::from_env().expect("create store");

    let older = sample_job();
    store.create(&older).await.expect("create older");
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let newer = sample_job();
    store.create(&newer).await.expect("create newer");

    let (jobs, total) = store
        .list(&JobFilter {
            status: Some(JobStatus::Queued),
            limit: 10,
            offset: 0,
        })
        .await
        .expect("list");

    assert!(total >= 2);
    let newer_pos = jobs.iter().position(|j| j.job_id == newer.job_id);
    let older_pos = jobs.iter().position(|j| j.job_id == older.job_id);
    if let (Some(n), Some(o)) = (newer_pos, older_pos) {
        assert!(n < o, "newest job must come first");
    }

    store.delete(&older.job_id).await.expect("delete");
    store.delete(&newer.job_id).await.expect("delete");
}
