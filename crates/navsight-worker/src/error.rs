//! Worker error types.
//!
//! The `Display` text of a job-fatal error is what gets recorded on the
//! failed `VideoJob`.

use thiserror::Error;

use navsight_firestore::FirestoreError;
use navsight_media::MediaError;
use navsight_models::ModelError;
use navsight_queue::QueueError;
use navsight_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Unsupported media: {0}")]
    UnsupportedMedia(String),

    /// Per-frame only; logged and counted, never stored on a job.
    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Narration failed: {0}")]
    Narration(String),

    #[error("Job withdrawn by owner")]
    Withdrawn,

    #[error("Processing interrupted: {0}")]
    Interrupted(String),

    #[error("Invalid job state: {0}")]
    State(#[from] ModelError),

    #[error("Job repository error: {0}")]
    Repository(#[from] FirestoreError),

    #[error("Media error: {0}")]
    Media(MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MediaError> for WorkerError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::UnsupportedMedia(msg) => Self::UnsupportedMedia(msg),
            other if other.is_unsupported_media() => Self::UnsupportedMedia(other.to_string()),
            other => Self::Media(other),
        }
    }
}

impl WorkerError {
    pub fn unsupported_media(msg: impl Into<String>) -> Self {
        Self::UnsupportedMedia(msg.into())
    }

    pub fn classification(msg: impl Into<String>) -> Self {
        Self::Classification(msg.into())
    }

    pub fn synthesis(msg: impl Into<String>) -> Self {
        Self::Synthesis(msg.into())
    }

    pub fn narration(msg: impl Into<String>) -> Self {
        Self::Narration(msg.into())
    }

    pub fn interrupted(msg: impl Into<String>) -> Self {
        Self::Interrupted(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Short label for the `outcome`/`reason` metric dimensions.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedMedia(_) => "unsupported_media",
            Self::Classification(_) => "classification",
            Self::Synthesis(_) => "synthesis",
            Self::Storage(_) => "storage",
            Self::Narration(_) => "narration",
            Self::Withdrawn => "withdrawn",
            Self::Interrupted(_) => "interrupted",
            Self::State(_) => "state",
            Self::Repository(_) => "repository",
            Self::Media(_) => "media",
            Self::Queue(_) => "queue",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_media_is_lifted() {
        let err: WorkerError = MediaError::unsupported_media("no video stream").into();
        assert!(matches!(err, WorkerError::UnsupportedMedia(_)));
        assert_eq!(err.to_string(), "Unsupported media: no video stream");
    }

    #[test]
    fn test_other_media_errors_stay_wrapped() {
        let err: WorkerError = MediaError::Timeout(30).into();
        assert_eq!(err.kind(), "media");
    }
}
