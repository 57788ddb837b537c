//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::{parse_progress_line, FfmpegProgress};

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output path (playlist for HLS outputs)
    output: PathBuf,
    /// Arguments placed before -i
    input_args: Vec<String>,
    /// Arguments placed after -i
    output_args: Vec<String>,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            log_level: "error".to_string(),
        }
    }

    /// Add an output argument (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set video bitrate.
    pub fn video_bitrate(self, kbps: u32) -> Self {
        self.output_arg("-b:v").output_arg(format!("{kbps}k"))
    }

    /// Set audio bitrate.
    pub fn audio_bitrate(self, kbps: u32) -> Self {
        self.output_arg("-b:a").output_arg(format!("{kbps}k"))
    }

    /// Set encoder preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Cap encoder threads; 0 lets the encoder use every core.
    pub fn threads(self, count: u32) -> Self {
        if count == 0 {
            self
        } else {
            self.output_arg("-threads").output_arg(count.to_string())
        }
    }

    /// Configure the HLS muxer: VOD playlist, fixed segment duration and
    /// zero-padded segment names next to the playlist.
    pub fn hls_output(self, segment_seconds: u32, segment_pattern: &Path) -> Self {
        self.output_args([
            "-f".to_string(),
            "hls".to_string(),
            "-hls_time".to_string(),
            segment_seconds.to_string(),
            "-hls_playlist_type".to_string(),
            "vod".to_string(),
            "-hls_list_size".to_string(),
            "0".to_string(),
            "-hls_segment_filename".to_string(),
            segment_pattern.to_string_lossy().to_string(),
        ])
    }

    /// Build the argument vector.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        args.push("-y".to_string());

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Machine-readable progress on stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner with progress tracking, hang detection and cancellation.
pub struct FfmpegRunner {
    cancel_rx: Option<watch::Receiver<bool>>,
    /// A window with no progress marker counts as silent
    stall_window: Duration,
    /// Silent windows tolerated before the process is terminated
    max_silent_windows: u32,
    /// Grace period between terminate and forced kill
    kill_grace: Duration,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self {
            cancel_rx: None,
            stall_window: Duration::from_secs(30),
            max_silent_windows: 2,
            kill_grace: Duration::from_secs(10),
        }
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Override the hang-detection window.
    pub fn with_stall_window(mut self, window: Duration) -> Self {
        self.stall_window = window;
        self
    }

    /// Run an FFmpeg command with a progress callback.
    pub async fn run_with_progress<F>(
        &self,
        cmd: &FfmpegCommand,
        mut progress_callback: F,
    ) -> MediaResult<()>
    where
        F: FnMut(FfmpegProgress),
    {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("running ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr = child.stderr.take().expect("stderr not captured");
        let mut lines = BufReader::new(stderr).lines();

        let mut cancel_rx = self.cancel_rx.clone();
        let mut current = FfmpegProgress::default();
        let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(64);
        let mut silent_windows = 0u32;

        loop {
            tokio::select! {
                biased;

                _ = wait_cancelled(&mut cancel_rx) => {
                    info!("encode cancelled, terminating encoder");
                    self.terminate(&mut child).await;
                    return Err(MediaError::Cancelled);
                }

                read = tokio::time::timeout(self.stall_window, lines.next_line()) => {
                    match read {
                        Ok(Ok(Some(line))) => {
                            silent_windows = 0;
                            if let Some(snapshot) = parse_progress_line(&line, &mut current) {
                                progress_callback(snapshot);
                            } else if !is_progress_key(&line) {
                                if stderr_tail.len() == 64 {
                                    stderr_tail.pop_front();
                                }
                                stderr_tail.push_back(line);
                            }
                        }
                        Ok(Ok(None)) => break,
                        Ok(Err(e)) => return Err(e.into()),
                        Err(_) => {
                            silent_windows += 1;
                            warn!(silent_windows, "no encoder progress within window");
                            if silent_windows >= self.max_silent_windows {
                                self.terminate(&mut child).await;
                                return Err(MediaError::Stalled(
                                    self.stall_window.as_secs() * u64::from(self.max_silent_windows),
                                ));
                            }
                        }
                    }
                }
            }
        }

        let status = child.wait().await?;

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::CommandFailed {
                stderr_tail: stderr_tail.into_iter().collect::<Vec<_>>().join("\n"),
                exit_code: status.code(),
            })
        }
    }

    /// Terminate the child, then force-kill after the grace period.
    async fn terminate(&self, child: &mut Child) {
        let _ = child.start_kill();
        if tokio::time::timeout(self.kill_grace, child.wait())
            .await
            .is_err()
        {
            let _ = child.kill().await;
        }
    }
}

/// Wait until cancellation is signalled; pends forever without a receiver.
async fn wait_cancelled(rx: &mut Option<watch::Receiver<bool>>) {
    match rx {
        Some(rx) => {
            if *rx.borrow() {
                return;
            }
            while rx.changed().await.is_ok() {
                if *rx.borrow() {
                    return;
                }
            }
            // Sender dropped without cancelling; never resolve.
            std::future::pending::<()>().await
        }
        None => std::future::pending::<()>().await,
    }
}

/// Lines belonging to the `-progress` key/value stream.
fn is_progress_key(line: &str) -> bool {
    const KEYS: [&str; 12] = [
        "frame=",
        "fps=",
        "bitrate=",
        "total_size=",
        "out_time_us=",
        "out_time_ms=",
        "out_time=",
        "dup_frames=",
        "drop_frames=",
        "speed=",
        "progress=",
        "stream_0_0_q=",
    ];
    let trimmed = line.trim_start();
    KEYS.iter().any(|k| trimmed.starts_with(k))
}

/// Check that ffmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check that ffprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_hls_args_in_order() {
        let cmd = FfmpegCommand::new("/tmp/in.mp4", "/tmp/out/360p/index.m3u8")
            .video_filter("scale=640:360")
            .video_codec("libx264")
            .preset("ultrafast")
            .video_bitrate(800)
            .audio_codec("aac")
            .audio_bitrate(96)
            .threads(0)
            .hls_output(15, Path::new("/tmp/out/360p/segment%03d.ts"));

        let args = cmd.build_args();
        let joined = args.join(" ");

        assert!(joined.starts_with("-y -v error -progress pipe:2 -i /tmp/in.mp4"));
        assert!(joined.contains("-vf scale=640:360"));
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-b:v 800k"));
        assert!(joined.contains("-b:a 96k"));
        assert!(joined.contains("-f hls -hls_time 15 -hls_playlist_type vod"));
        assert!(joined.contains("-hls_segment_filename /tmp/out/360p/segment%03d.ts"));
        assert!(joined.ends_with("/tmp/out/360p/index.m3u8"));
        // threads(0) means unrestricted: no -threads flag at all
        assert!(!joined.contains("-threads"));
    }

    #[test]
    fn thread_cap_is_applied() {
        let cmd = FfmpegCommand::new("in.mp4", "out.m3u8").threads(2);
        let args = cmd.build_args();
        let pos = args.iter().position(|a| a == "-threads").unwrap();
        assert_eq!(args[pos + 1], "2");
    }

    #[test]
    fn progress_keys_are_not_stderr_noise() {
        assert!(is_progress_key("frame=100"));
        assert!(is_progress_key("  speed=1.01x"));
        assert!(!is_progress_key("[libx264 @ 0x55] broken header"));
    }
}
