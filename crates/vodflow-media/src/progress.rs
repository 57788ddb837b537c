//! Encoder progress parsing.

use serde::{Deserialize, Serialize};
use vodflow_models::Resolution;

/// Raw progress counters from ffmpeg's `-progress` output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current encode FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed relative to realtime
    pub speed: f64,
    /// Whether encoding reported `progress=end`
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Progress percentage given the input duration in milliseconds.
    pub fn percentage(&self, total_duration_ms: i64) -> u8 {
        if total_duration_ms <= 0 {
            return 0;
        }
        let pct = (self.out_time_ms as f64 / total_duration_ms as f64) * 100.0;
        pct.clamp(0.0, 100.0) as u8
    }
}

/// A progress event for one rendition: `(resolution, percent)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeProgress {
    pub resolution: Resolution,
    /// 0-100 within this rendition
    pub percent: u8,
}

/// Parse one line of ffmpeg's key=value progress stream, updating `current`.
/// Returns a snapshot whenever a `progress=` marker closes a block.
pub fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let line = line.trim();

    if let Some((key, value)) = line.split_once('=') {
        match key {
            "out_time_ms" | "out_time_us" => {
                // Despite the name, ffmpeg emits microseconds for both keys.
                if let Ok(us) = value.parse::<i64>() {
                    current.out_time_ms = us / 1000;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    current.frame = frame;
                }
            }
            "fps" => {
                if let Ok(fps) = value.parse() {
                    current.fps = fps;
                }
            }
            "speed" => {
                if value != "N/A" {
                    if let Some(speed_str) = value.strip_suffix('x') {
                        if let Ok(speed) = speed_str.parse() {
                            current.speed = speed;
                        }
                    }
                }
            }
            "progress" => {
                if value == "end" {
                    current.is_complete = true;
                }
                return Some(current.clone());
            }
            _ => {}
        }
    }

    None
}

/// Mean of per-resolution percents, the driver-level overall progress.
pub fn overall_percent(per_resolution: &[(Resolution, u8)]) -> u8 {
    if per_resolution.is_empty() {
        return 0;
    }
    let sum: u32 = per_resolution.iter().map(|(_, p)| u32::from(*p)).sum();
    (sum / per_resolution.len() as u32) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_progress_blocks() {
        let mut progress = FfmpegProgress::default();

        assert!(parse_progress_line("out_time_ms=5000000", &mut progress).is_none());
        assert_eq!(progress.out_time_ms, 5000);

        parse_progress_line("speed=1.5x", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);

        let snapshot = parse_progress_line("progress=continue", &mut progress);
        assert!(snapshot.is_some());
        assert!(!snapshot.unwrap().is_complete);

        let done = parse_progress_line("progress=end", &mut progress);
        assert!(done.unwrap().is_complete);
    }

    #[test]
    fn percentage_clamps() {
        let progress = FfmpegProgress {
            out_time_ms: 30_000,
            ..Default::default()
        };
        assert_eq!(progress.percentage(60_000), 50);
        assert_eq!(progress.percentage(20_000), 100);
        assert_eq!(progress.percentage(0), 0);
    }

    #[test]
    fn overall_is_mean_of_renditions() {
        let per = [
            (Resolution::R480p, 100),
            (Resolution::R720p, 40),
            (Resolution::R1080p, 10),
        ];
        assert_eq!(overall_percent(&per), 50);
        assert_eq!(overall_percent(&[]), 0);
    }
}
