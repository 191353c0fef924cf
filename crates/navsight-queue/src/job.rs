//! Queue message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use navsight_models::{JobId, VideoJob};

/// Hand-off from `submitJob` to a worker.
///
/// The message only names the job; the worker reads the authoritative
/// record from the job repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationJob {
    pub job_id: JobId,
    pub owner_id: String,
    pub enqueued_at: DateTime<Utc>,
}

impl NarrationJob {
    pub fn new(job_id: JobId, owner_id: impl Into<String>) -> Self {
        Self {
            job_id,
            owner_id: owner_id.into(),
            enqueued_at: Utc::now(),
        }
    }

    pub fn for_job(job: &VideoJob) -> Self {
        Self::new(job.id.clone(), job.owner_id.clone())
    }
}

/// A message handed to a consumer.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Stream entry id, needed to acknowledge the message.
    pub message_id: String,
    pub job: NarrationJob,
    /// True when the message was reclaimed from another consumer.
    pub redelivered: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_wire_format() {
        let job = VideoJob::new("owner-1", "walk.mp4");
        let message = NarrationJob::for_job(&job);
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value["job_id"], json!(job.id.as_str()));
        assert_eq!(value["owner_id"], "owner-1");
        assert!(value["enqueued_at"].is_string());
    }

    #[test]
    fn test_message_parses_from_payload() {
        let payload = r#"{"job_id":"j1","owner_id":"o","enqueued_at":"2026-03-01T10:00:00Z"}"#;
        let message: NarrationJob = serde_json::from_str(payload).unwrap();
        assert_eq!(message.job_id.as_str(), "j1");
    }
}
