//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Cannot reach the job stream: {0}")]
    ConnectionFailed(String),

    #[error("Narration job was not queued: {0}")]
    EnqueueFailed(String),

    /// A stream entry that does not decode to a `NarrationJob`.
    #[error("Malformed job message: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error("Job message encoding: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn enqueue_failed(msg: impl Into<String>) -> Self {
        Self::EnqueueFailed(msg.into())
    }

    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }
}
