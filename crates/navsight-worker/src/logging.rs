//! Per-job log lines.
//!
//! Every event carries `job_id` and the pipeline `stage` so a single run can
//! be followed through the JSON logs.

use tracing::{error, info, info_span, warn, Span};

use navsight_models::JobId;

#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    stage: &'static str,
}

impl JobLogger {
    pub fn new(job_id: &JobId, stage: &'static str) -> Self {
        Self {
            job_id: job_id.clone(),
            stage,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, stage = self.stage, "start: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(job_id = %self.job_id, stage = self.stage, "{}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, stage = self.stage, "{}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, stage = self.stage, "failed: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(job_id = %self.job_id, stage = self.stage, "done: {}", message);
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Span the whole run is instrumented under.
    pub fn create_span(&self) -> Span {
        info_span!("narration_job", job_id = %self.job_id, stage = self.stage)
    }
}
