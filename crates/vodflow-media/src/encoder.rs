//! HLS ladder encoder.

use std::path::Path;

use tokio::sync::watch;
use tracing::{info, warn};

use vodflow_models::{EncoderPreset, Resolution, Stage};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::playlist::render_master_playlist;
use crate::probe::probe_duration_ms;
use crate::progress::EncodeProgress;

/// Segment duration for all renditions.
pub const SEGMENT_SECONDS: u32 = 15;

/// What to encode and what the master playlist should reference.
#[derive(Debug, Clone)]
pub struct EncodeSpec {
    /// Renditions to encode, in order
    pub target_resolutions: Vec<Resolution>,
    /// Renditions the generated master playlist lists. May be a superset of
    /// the targets when a prior stage already produced some.
    pub playlist_resolutions: Vec<Resolution>,
    /// Speed/quality trade-off
    pub preset: EncoderPreset,
    /// Thread cap; 0 means unrestricted
    pub cpu_threads: u32,
}

impl EncodeSpec {
    /// The spec a pipeline stage runs with. The fast lane takes the whole
    /// machine for a single cheap rendition; the background lane is capped
    /// so it never starves a concurrent fast encode.
    pub fn for_stage(stage: Stage, background_threads: u32) -> Self {
        match stage {
            Stage::Fast => Self {
                target_resolutions: stage.target_resolutions(),
                playlist_resolutions: stage.playlist_resolutions(),
                preset: EncoderPreset::Ultrafast,
                cpu_threads: 0,
            },
            Stage::Background => Self {
                target_resolutions: stage.target_resolutions(),
                playlist_resolutions: stage.playlist_resolutions(),
                preset: EncoderPreset::Medium,
                cpu_threads: background_threads,
            },
        }
    }
}

/// Drives ffmpeg to produce `{output_dir}/{tag}/index.m3u8` plus segments
/// for every target resolution, then writes `{output_dir}/master.m3u8`.
#[derive(Debug, Clone, Default)]
pub struct HlsEncoder {
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl HlsEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set cancellation signal, honored between renditions and mid-encode.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Encode every target rendition sequentially, emitting
    /// `(resolution, percent)` progress events.
    ///
    /// A failing rendition is discarded from disk before the error
    /// surfaces, so partial output never reaches the upload step.
    pub async fn transcode<F>(
        &self,
        input: &Path,
        output_dir: &Path,
        spec: &EncodeSpec,
        mut on_progress: F,
    ) -> MediaResult<()>
    where
        F: FnMut(EncodeProgress),
    {
        let duration_ms = probe_duration_ms(input).await?;
        info!(
            input = %input.display(),
            duration_ms,
            renditions = spec.target_resolutions.len(),
            "starting encode"
        );

        for &resolution in &spec.target_resolutions {
            if self.is_cancelled() {
                return Err(MediaError::Cancelled);
            }

            self.encode_rendition(input, output_dir, spec, resolution, duration_ms, &mut on_progress)
                .await?;

            on_progress(EncodeProgress {
                resolution,
                percent: 100,
            });
        }

        let master = render_master_playlist(&spec.playlist_resolutions);
        tokio::fs::write(output_dir.join("master.m3u8"), master).await?;

        Ok(())
    }

    async fn encode_rendition<F>(
        &self,
        input: &Path,
        output_dir: &Path,
        spec: &EncodeSpec,
        resolution: Resolution,
        duration_ms: i64,
        on_progress: &mut F,
    ) -> MediaResult<()>
    where
        F: FnMut(EncodeProgress),
    {
        let rendition_dir = output_dir.join(resolution.tag());
        tokio::fs::create_dir_all(&rendition_dir).await?;

        let playlist_path = rendition_dir.join("index.m3u8");
        let segment_pattern = rendition_dir.join("segment%03d.ts");

        let cmd = FfmpegCommand::new(input, &playlist_path)
            .video_filter(format!("scale={}:{}", resolution.width(), resolution.height()))
            .video_codec("libx264")
            .preset(spec.preset.as_str())
            .video_bitrate(resolution.video_bitrate_kbps())
            .audio_codec("aac")
            .audio_bitrate(resolution.audio_bitrate_kbps())
            .threads(spec.cpu_threads)
            .hls_output(SEGMENT_SECONDS, &segment_pattern);

        let mut runner = FfmpegRunner::new();
        if let Some(rx) = &self.cancel_rx {
            runner = runner.with_cancel(rx.clone());
        }

        let result = runner
            .run_with_progress(&cmd, |p| {
                on_progress(EncodeProgress {
                    resolution,
                    percent: p.percentage(duration_ms).min(99),
                });
            })
            .await;

        match result {
            Ok(()) => {
                if !playlist_path.exists() {
                    self.discard_rendition(&rendition_dir).await;
                    return Err(MediaError::MissingOutput(resolution));
                }
                info!(resolution = %resolution, "rendition encoded");
                Ok(())
            }
            Err(MediaError::Cancelled) => {
                self.discard_rendition(&rendition_dir).await;
                Err(MediaError::Cancelled)
            }
            Err(MediaError::CommandFailed {
                stderr_tail,
                exit_code,
            }) => {
                self.discard_rendition(&rendition_dir).await;
                Err(MediaError::encoder_failed(resolution, stderr_tail, exit_code))
            }
            Err(MediaError::Stalled(secs)) => {
                self.discard_rendition(&rendition_dir).await;
                Err(MediaError::encoder_failed(
                    resolution,
                    format!("encoder emitted no progress for {secs} seconds"),
                    None,
                ))
            }
            Err(other) => {
                self.discard_rendition(&rendition_dir).await;
                Err(other)
            }
        }
    }

    /// Remove a partially produced rendition directory.
    async fn discard_rendition(&self, dir: &Path) {
        if let Err(e) = tokio::fs::remove_dir_all(dir).await {
            warn!(dir = %dir.display(), error = %e, "failed to discard partial rendition");
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_rx.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_stage_spec() {
        let spec = EncodeSpec::for_stage(Stage::Fast, 2);
        assert_eq!(spec.target_resolutions, vec![Resolution::R360p]);
        assert_eq!(spec.playlist_resolutions, vec![Resolution::R360p]);
        assert_eq!(spec.preset, EncoderPreset::Ultrafast);
        assert_eq!(spec.cpu_threads, 0);
    }

    #[test]
    fn background_stage_spec_lists_full_ladder() {
        let spec = EncodeSpec::for_stage(Stage::Background, 2);
        assert_eq!(
            spec.target_resolutions,
            vec![Resolution::R480p, Resolution::R720p, Resolution::R1080p]
        );
        assert_eq!(spec.playlist_resolutions, Resolution::ALL.to_vec());
        assert_eq!(spec.preset, EncoderPreset::Medium);
        assert_eq!(spec.cpu_threads, 2);
    }
}
