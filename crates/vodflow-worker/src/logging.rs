//! Structured job logging.

use tracing::{error, info, warn};
use vodflow_models::JobId;

/// Logger carrying job context through the processing routine.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    lane: &'static str,
}

impl JobLogger {
    pub fn new(job_id: &JobId, lane: &'static str) -> Self {
        Self {
            job_id: job_id.to_string(),
            lane,
        }
    }

    pub fn start(&self, message: &str) {
        info!(job_id = %self.job_id, lane = self.lane, "{message}");
    }

    pub fn step(&self, message: &str) {
        info!(job_id = %self.job_id, lane = self.lane, "{message}");
    }

    pub fn warning(&self, message: &str) {
        warn!(job_id = %self.job_id, lane = self.lane, "{message}");
    }

    pub fn failure(&self, message: &str) {
        error!(job_id = %self.job_id, lane = self.lane, "{message}");
    }
}
