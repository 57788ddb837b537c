//! Durable job store.
//!
//! Each job is a single JSON record with a version counter; updates go
//! through an optimistic compare-and-swap so concurrent writers (scheduler
//! event mirroring, workers, admission API) never clobber each other.

pub mod error;
pub mod patch;
pub mod store;

pub use error::{JobStoreError, JobStoreResult};
pub use patch::JobPatch;
pub use store::{JobFilter, JobStore, JobStoreConfig, StatusCounts};
