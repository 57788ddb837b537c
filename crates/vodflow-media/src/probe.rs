//! Input probing via ffprobe.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Probe the container duration of a local video file, in milliseconds.
///
/// A zero or missing duration is rejected: the encoder would fail on such
/// input anyway, and failing fast gives a clearer error.
pub async fn probe_duration_ms(input: impl AsRef<Path>) -> MediaResult<i64> {
    check_ffprobe()?;

    let input = input.as_ref();
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
        ])
        .arg(input)
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::ProbeFailed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)?;
    let duration_secs: f64 = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse().ok())
        .unwrap_or(0.0);

    if duration_secs <= 0.0 {
        return Err(MediaError::InvalidVideo(format!(
            "{} has no playable duration",
            input.display()
        )));
    }

    Ok((duration_secs * 1000.0) as i64)
}
