//! Transcode worker.
//!
//! Workers bind to one lane each and drive claimed entries through the
//! download → encode → upload → notify → enqueue-next-stage routine, with
//! heartbeat-renewed locks and tempdir cleanup on every exit path.

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod processor;
pub mod webhook;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::WorkerPool;
pub use processor::ProcessContext;
pub use webhook::{WebhookConfig, WebhookNotifier};
