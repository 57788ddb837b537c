//! The per-entry processing routine.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tokio::sync::{mpsc, watch};
use tracing::warn;

use vodflow_jobs::JobPatch;
use vodflow_media::{EncodeProgress, EncodeSpec, HlsEncoder};
use vodflow_models::{
    derive_output_prefix, Job, JobId, RenditionProgress, RenditionState, Resolution, Stage,
};
use vodflow_queue::{QueueEntry, QueueError, QueueName, Scheduler};
use vodflow_storage::ObjectStore;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::webhook::WebhookNotifier;

/// Progress milestones within a stage.
const PROGRESS_CLAIMED: u8 = 5;
const PROGRESS_INPUT_READY: u8 = 10;
const PROGRESS_ENCODE_END: u8 = 70;
const PROGRESS_UPLOADED: u8 = 95;

/// Map driver-level encode progress (0-100) into the stage-local window
/// between the input-ready and upload milestones.
pub fn map_encode_progress(overall: u8) -> u8 {
    let span = u32::from(PROGRESS_ENCODE_END - PROGRESS_INPUT_READY);
    PROGRESS_INPUT_READY + (u32::from(overall.min(100)) * span / 100) as u8
}

/// Everything a worker needs to process entries. Services are injected; the
/// processor holds no global state.
#[derive(Clone)]
pub struct ProcessContext {
    pub config: WorkerConfig,
    pub storage: ObjectStore,
    pub scheduler: Scheduler,
    pub notifier: Option<WebhookNotifier>,
    pub shutdown: watch::Receiver<bool>,
}

impl ProcessContext {
    /// Cancellation boundary: refuse to continue once shutdown began.
    fn check_shutdown(&self) -> WorkerResult<()> {
        if *self.shutdown.borrow() {
            Err(WorkerError::ShuttingDown)
        } else {
            Ok(())
        }
    }
}

/// Drive one claimed entry through download → encode → upload → notify →
/// enqueue-next-stage. Returns the playable master playlist URL.
///
/// The scoped tempdir is removed on every exit path; cancellation is
/// honored at step boundaries and inside the encoder.
pub async fn process_entry(ctx: &ProcessContext, entry: &QueueEntry) -> WorkerResult<String> {
    let job_id = &entry.job_id;
    let stage = entry.payload.stage;
    let log = JobLogger::new(job_id, stage.as_str());
    log.start("processing claimed entry");

    let job = ctx.scheduler.jobs().get(job_id).await?;
    ctx.scheduler.progress(job_id, PROGRESS_CLAIMED).await;

    let tempdir = tempfile::Builder::new()
        .prefix("vodflow-")
        .tempdir_in(&ctx.config.temp_root)?;

    // Acquire input: an adjacent ingest component may have left a local
    // file; otherwise pull the source from the object store.
    let input_path = acquire_input(ctx, entry, tempdir.path()).await?;
    ctx.scheduler.progress(job_id, PROGRESS_INPUT_READY).await;
    ctx.check_shutdown()?;

    // Encode all target renditions for this stage.
    let spec = EncodeSpec::for_stage(stage, ctx.config.background_threads);
    run_encode(ctx, job_id, &spec, &input_path, tempdir.path()).await?;
    ctx.check_shutdown()?;
    log.step("encode finished");

    // Upload the HLS tree.
    let output_prefix = derive_output_prefix(&entry.payload.raw_object_key);
    ctx.storage
        .upload_tree(tempdir.path().join("hls"), &output_prefix)
        .await?;
    ctx.scheduler.progress(job_id, PROGRESS_UPLOADED).await;
    log.step("output tree uploaded");

    // Finalize the job record: playable URL and per-rendition completion.
    let hls_master_url = format!(
        "{}/hls/{}/master.m3u8",
        ctx.config.api_base_url, output_prefix
    );
    let mut patch = JobPatch::new().hls_master_url(hls_master_url.clone());
    for resolution in &spec.target_resolutions {
        patch = patch.rendition(
            *resolution,
            RenditionProgress {
                status: RenditionState::Completed,
                progress: 100,
            },
        );
    }
    ctx.scheduler.jobs().update(job_id, &patch, None).await?;

    // Notify the external system. Best effort, never fails the job.
    if let (Some(notifier), Some(correlation_id)) =
        (&ctx.notifier, entry.payload.correlation_id.as_deref())
    {
        notifier.notify(correlation_id, &hls_master_url).await;
    }

    // A completed fast stage spawns the HD sibling.
    if stage == Stage::Fast {
        enqueue_background_sibling(ctx, &job).await;
    }

    log.step("entry processed");
    Ok(hls_master_url)
}

/// Resolve the input file, downloading from the object store when no local
/// ingest file is available.
async fn acquire_input(
    ctx: &ProcessContext,
    entry: &QueueEntry,
    tempdir: &std::path::Path,
) -> WorkerResult<PathBuf> {
    if let Some(local) = &entry.payload.local_path {
        let path = PathBuf::from(local);
        if path.is_file() {
            return Ok(path);
        }
        warn!(path = %path.display(), "ingest-provided local file missing, downloading instead");
    }

    let key = &entry.payload.raw_object_key;
    let extension = key
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.').map(|(_, ext)| format!(".{ext}")))
        .unwrap_or_default();
    let destination = tempdir.join(format!("input{extension}"));

    ctx.storage.download(key, &destination).await?;
    Ok(destination)
}

/// Run the encoder, forwarding per-rendition progress into the stage-local
/// 10-70% window of the job record.
async fn run_encode(
    ctx: &ProcessContext,
    job_id: &JobId,
    spec: &EncodeSpec,
    input: &std::path::Path,
    tempdir: &std::path::Path,
) -> WorkerResult<()> {
    let output_dir = tempdir.join("hls");
    tokio::fs::create_dir_all(&output_dir).await?;

    let (tx, rx) = mpsc::unbounded_channel::<EncodeProgress>();
    let forwarder = tokio::spawn(forward_progress(
        ctx.scheduler.clone(),
        job_id.clone(),
        spec.target_resolutions.clone(),
        rx,
    ));

    let encoder = HlsEncoder::new().with_cancel(ctx.shutdown.clone());
    let result = encoder
        .transcode(input, &output_dir, spec, move |progress| {
            let _ = tx.send(progress);
        })
        .await;

    forwarder.await.ok();
    result.map_err(WorkerError::from)
}

/// Receive encoder progress events and mirror them: overall progress is the
/// mean over the stage's renditions, mapped into the 10-70% window.
async fn forward_progress(
    scheduler: Scheduler,
    job_id: JobId,
    targets: Vec<Resolution>,
    mut rx: mpsc::UnboundedReceiver<EncodeProgress>,
) {
    let mut per_resolution: BTreeMap<Resolution, u8> =
        targets.iter().map(|r| (*r, 0)).collect();
    let mut last_sent = 0u8;

    while let Some(event) = rx.recv().await {
        per_resolution.insert(event.resolution, event.percent);

        let sum: u32 = per_resolution.values().map(|p| u32::from(*p)).sum();
        let overall = (sum / per_resolution.len().max(1) as u32) as u8;
        let mapped = map_encode_progress(overall);

        if mapped > last_sent {
            last_sent = mapped;
            scheduler.progress(&job_id, mapped).await;
        }

        // Mirror per-rendition encode progress so pollers see the ladder
        // fill in. A rendition only turns completed after its files are
        // uploaded, in the finalize patch.
        if event.percent == 100 {
            let patch = JobPatch::new().rendition(
                event.resolution,
                RenditionProgress {
                    status: RenditionState::Encoding,
                    progress: 100,
                },
            );
            if let Err(e) = scheduler.jobs().update(&job_id, &patch, None).await {
                warn!(job_id = %job_id, error = %e, "failed to mirror rendition progress");
            }
        }
    }
}

/// Create and enqueue the background-stage sibling. Replays collide on the
/// deterministic sibling ID and are skipped.
async fn enqueue_background_sibling(ctx: &ProcessContext, fast_job: &Job) {
    let sibling = fast_job.background_sibling();

    match ctx.scheduler.submit(QueueName::Background, &sibling).await {
        Ok(_) => {}
        Err(QueueError::JobStore(vodflow_jobs::JobStoreError::Conflict(_)))
        | Err(QueueError::AlreadyQueued(_)) => {
            warn!(
                job_id = %fast_job.job_id,
                sibling_id = %sibling.job_id,
                "background sibling already enqueued, skipping"
            );
        }
        Err(e) => {
            // The fast stage result stays valid; the sibling can be
            // recovered through the admission retry path.
            warn!(
                job_id = %fast_job.job_id,
                error = %e,
                "failed to enqueue background sibling"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_window_maps_into_stage_progress() {
        assert_eq!(map_encode_progress(0), 10);
        assert_eq!(map_encode_progress(50), 40);
        assert_eq!(map_encode_progress(100), 70);
        assert_eq!(map_encode_progress(200), 70);
    }

    #[test]
    fn milestones_are_ordered() {
        assert!(PROGRESS_CLAIMED < PROGRESS_INPUT_READY);
        assert!(PROGRESS_INPUT_READY < PROGRESS_ENCODE_END);
        assert!(PROGRESS_ENCODE_END < PROGRESS_UPLOADED);
        assert!(PROGRESS_UPLOADED < 100);
    }
}
