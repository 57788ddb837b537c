//! S3-compatible object store adapter.
//!
//! This crate provides:
//! - Streaming upload/download against a private bucket
//! - Atomic downloads to the local filesystem
//! - Recursive upload of an HLS output tree
//! - Listing, HEAD metadata and presigned GET URLs
//! - Transient-error retries with exponential backoff

pub mod client;
pub mod content_type;
pub mod error;
pub mod retry;

pub use client::{ObjectInfo, ObjectStore, ObjectStoreConfig, ObjectStream};
pub use content_type::content_type_for;
pub use error::{StorageError, StorageResult};
pub use retry::{retry_transient, RetryPolicy};
