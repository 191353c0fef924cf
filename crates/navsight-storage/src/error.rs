//! Storage error types.

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

/// Failures talking to the artifact bucket.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage is misconfigured: {0}")]
    ConfigError(String),

    /// No object under the key. Callers turn this into a 404 or an
    /// unsupported-media failure.
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Audio upload failed: {0}")]
    UploadFailed(String),

    #[error("Video download failed: {0}")]
    DownloadFailed(String),

    #[error("Could not sign download URL: {0}")]
    PresignFailed(String),

    /// Owner id or video ref that would escape its prefix.
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Local file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object store request failed: {0}")]
    AwsSdk(String),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}
