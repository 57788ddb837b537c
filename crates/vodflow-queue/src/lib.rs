//! Two-lane transcode queue and scheduler.
//!
//! The queue owns ephemeral entries with heartbeat-renewed locks; the
//! scheduler wraps it, mirrors lifecycle events into the durable job store,
//! and runs the stall sweeper that recovers entries from crashed workers.

pub mod backoff;
pub mod config;
pub mod entry;
pub mod error;
pub mod queue;
pub mod scheduler;

pub use backoff::retry_delay;
pub use config::{LaneConfig, QueueConfig, QueueName};
pub use entry::{EntryState, QueueEntry, QueuePayload};
pub use error::{QueueError, QueueResult};
pub use queue::{JobQueue, QueueStats, RetryOutcome, StallOutcome};
pub use scheduler::Scheduler;
