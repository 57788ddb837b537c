//! Shared data models for the vodflow backend.
//!
//! This crate provides Serde-serializable types for:
//! - Transcode jobs and their lifecycle
//! - HLS rendition parameters (the fixed resolution ladder)
//! - Queue payloads and lifecycle events
//! - Object-store key derivation

pub mod event;
pub mod job;
pub mod keys;
pub mod resolution;

// Re-export common types
pub use event::QueueEvent;
pub use job::{Job, JobError, JobId, JobStatus, RenditionProgress, RenditionState, Stage};
pub use keys::{derive_output_prefix, is_raw_video_key, RAW_VIDEO_PREFIX};
pub use resolution::{EncoderPreset, Resolution};
