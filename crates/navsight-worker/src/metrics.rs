//! Worker metrics.

use metrics::{counter, histogram};

pub mod names {
    pub const JOBS_TOTAL: &str = "navsight_jobs_total";
    pub const JOB_DURATION_SECONDS: &str = "navsight_job_duration_seconds";
    pub const FRAMES_CLASSIFIED_TOTAL: &str = "navsight_frames_classified_total";
    pub const CLASSIFICATION_FAILURES_TOTAL: &str = "navsight_classification_failures_total";
}

/// Record a job reaching a terminal state.
pub fn record_job(outcome: &str, duration_secs: f64) {
    counter!(names::JOBS_TOTAL, "outcome" => outcome.to_string()).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => outcome.to_string()).record(duration_secs);
}

pub fn record_frame_classified() {
    counter!(names::FRAMES_CLASSIFIED_TOTAL).increment(1);
}

/// `reason` is `timeout` or `service`.
pub fn record_classification_failure(reason: &str) {
    counter!(names::CLASSIFICATION_FAILURES_TOTAL, "reason" => reason.to_string()).increment(1);
}
