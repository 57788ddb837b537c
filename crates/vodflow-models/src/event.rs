//! Queue lifecycle events.

use serde::{Deserialize, Serialize};

/// Lifecycle event emitted by the queue for one entry.
///
/// Events are delivered at least once; the scheduler mirrors them into the
/// job store with idempotent updates, so replays are harmless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// Entry accepted into the waiting set
    Added,
    /// A worker claimed the entry; `attempts` counts this execution
    Active { attempts: u32 },
    /// Stage-local overall progress, 0-100
    Progress { value: u8 },
    /// The entry finished; `hls_url` is the playable master playlist
    Completed { hls_url: Option<String> },
    /// The entry failed permanently
    Failed { reason: String },
    /// The entry's lock expired without heartbeat; it is back in waiting
    Stalled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_serde_roundtrip() {
        let events = vec![
            QueueEvent::Added,
            QueueEvent::Active { attempts: 2 },
            QueueEvent::Progress { value: 42 },
            QueueEvent::Completed {
                hls_url: Some("/api/upload/hls/p/master.m3u8".into()),
            },
            QueueEvent::Failed {
                reason: "EncoderError: 360p".into(),
            },
            QueueEvent::Stalled,
        ];
        for event in events {
            let json = serde_json::to_string(&event).unwrap();
            let back: QueueEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(back, event);
        }
    }

    #[test]
    fn progress_wire_shape() {
        let json = serde_json::to_string(&QueueEvent::Progress { value: 70 }).unwrap();
        assert_eq!(json, r#"{"type":"progress","value":70}"#);
    }
}
