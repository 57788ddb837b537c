//! The fixed HLS rendition ladder.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One quality level of the adaptive-bitrate ladder.
///
/// The encoding parameters per resolution are fixed; the table lives here so
/// the encoder driver, the master playlist writer and the API all agree.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    #[serde(rename = "360p")]
    R360p,
    #[serde(rename = "480p")]
    R480p,
    #[serde(rename = "720p")]
    R720p,
    #[serde(rename = "1080p")]
    R1080p,
}

impl Resolution {
    /// All resolutions, ascending by bitrate.
    pub const ALL: [Resolution; 4] = [
        Resolution::R360p,
        Resolution::R480p,
        Resolution::R720p,
        Resolution::R1080p,
    ];

    /// Short tag used in object keys and playlists (`360p`, `480p`, ...).
    pub fn tag(&self) -> &'static str {
        match self {
            Resolution::R360p => "360p",
            Resolution::R480p => "480p",
            Resolution::R720p => "720p",
            Resolution::R1080p => "1080p",
        }
    }

    /// Parse a tag back into a resolution.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "360p" => Some(Resolution::R360p),
            "480p" => Some(Resolution::R480p),
            "720p" => Some(Resolution::R720p),
            "1080p" => Some(Resolution::R1080p),
            _ => None,
        }
    }

    /// Output frame width in pixels.
    pub fn width(&self) -> u32 {
        match self {
            Resolution::R360p => 640,
            Resolution::R480p => 854,
            Resolution::R720p => 1280,
            Resolution::R1080p => 1920,
        }
    }

    /// Output frame height in pixels.
    pub fn height(&self) -> u32 {
        match self {
            Resolution::R360p => 360,
            Resolution::R480p => 480,
            Resolution::R720p => 720,
            Resolution::R1080p => 1080,
        }
    }

    /// Target video bitrate in kbps.
    pub fn video_bitrate_kbps(&self) -> u32 {
        match self {
            Resolution::R360p => 800,
            Resolution::R480p => 1400,
            Resolution::R720p => 2800,
            Resolution::R1080p => 5000,
        }
    }

    /// Target audio bitrate in kbps.
    pub fn audio_bitrate_kbps(&self) -> u32 {
        match self {
            Resolution::R360p => 96,
            Resolution::R480p | Resolution::R720p => 128,
            Resolution::R1080p => 192,
        }
    }

    /// Combined bandwidth (video + audio) in bits per second, as advertised
    /// in the master playlist's `BANDWIDTH` attribute.
    pub fn bandwidth_bps(&self) -> u64 {
        u64::from(self.video_bitrate_kbps() + self.audio_bitrate_kbps()) * 1000
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Encoder speed/quality trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum EncoderPreset {
    /// Fastest encode, used for the first playable rendition.
    Ultrafast,
    Fast,
    /// Balanced, used for the HD background stage.
    #[default]
    Medium,
}

impl EncoderPreset {
    /// The value passed to the encoder's `-preset` flag.
    pub fn as_str(&self) -> &'static str {
        match self {
            EncoderPreset::Ultrafast => "ultrafast",
            EncoderPreset::Fast => "fast",
            EncoderPreset::Medium => "medium",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_is_ascending_by_bandwidth() {
        let bandwidths: Vec<u64> = Resolution::ALL.iter().map(|r| r.bandwidth_bps()).collect();
        let mut sorted = bandwidths.clone();
        sorted.sort_unstable();
        assert_eq!(bandwidths, sorted);
    }

    #[test]
    fn rendition_table_matches_ladder() {
        assert_eq!(Resolution::R360p.width(), 640);
        assert_eq!(Resolution::R360p.height(), 360);
        assert_eq!(Resolution::R360p.bandwidth_bps(), 896_000);
        assert_eq!(Resolution::R1080p.video_bitrate_kbps(), 5000);
        assert_eq!(Resolution::R1080p.bandwidth_bps(), 5_192_000);
    }

    #[test]
    fn tag_roundtrip() {
        for r in Resolution::ALL {
            assert_eq!(Resolution::from_tag(r.tag()), Some(r));
        }
        assert_eq!(Resolution::from_tag("240p"), None);
    }

    #[test]
    fn serde_uses_tags() {
        let json = serde_json::to_string(&Resolution::R720p).unwrap();
        assert_eq!(json, "\"720p\"");
        let back: Resolution = serde_json::from_str("\"1080p\"").unwrap();
        assert_eq!(back, Resolution::R1080p);
    }
}
