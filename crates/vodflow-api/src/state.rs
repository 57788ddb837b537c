//! Application state.

use std::sync::Arc;

use vodflow_jobs::JobStore;
use vodflow_queue::{JobQueue, Scheduler};
use vodflow_storage::ObjectStore;

use crate::config::ApiConfig;

/// Shared application state. Services are injected once here; handlers
/// never construct clients of their own.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub storage: Arc<ObjectStore>,
    pub scheduler: Scheduler,
}

impl AppState {
    /// Create application state from the environment.
    pub fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let storage = ObjectStore::from_env()?;
        let queue = JobQueue::from_env()?;
        let jobs = JobStore::from_env()?;
        let scheduler = Scheduler::new(Arc::new(queue), Arc::new(jobs));

        Ok(Self {
            config,
            storage: Arc::new(storage),
            scheduler,
        })
    }
}
