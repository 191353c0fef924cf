//! Upload constraints for source videos.

use thiserror::Error;

/// Default container extensions accepted for upload.
pub const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "wmv", "mkv"];

/// Default maximum upload size (1 GiB).
pub const DEFAULT_MAX_VIDEO_BYTES: u64 = 1024 * 1024 * 1024;

/// Reason a video reference or upload is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadViolation {
    #[error("Invalid video reference: {0}")]
    InvalidRef(String),

    #[error("Unsupported video format: {0}")]
    UnsupportedFormat(String),

    #[error("Video too large: {size} bytes exceeds limit of {max} bytes")]
    TooLarge { size: u64, max: u64 },
}

/// Validate that a video reference is a single safe path segment.
pub fn validate_video_ref(video_ref: &str) -> Result<(), UploadViolation> {
    let trimmed = video_ref.trim();
    if trimmed.is_empty() || trimmed != video_ref {
        return Err(UploadViolation::InvalidRef(video_ref.to_string()));
    }
    if video_ref.len() > 256 {
        return Err(UploadViolation::InvalidRef("reference too long".to_string()));
    }
    if video_ref.contains('/')
        || video_ref.contains('\\')
        || video_ref.contains("..")
        || video_ref.chars().any(char::is_control)
    {
        return Err(UploadViolation::InvalidRef(video_ref.to_string()));
    }
    Ok(())
}

/// Accepted container formats and size ceiling.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub allowed_extensions: Vec<String>,
    pub max_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            allowed_extensions: DEFAULT_VIDEO_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            max_bytes: DEFAULT_MAX_VIDEO_BYTES,
        }
    }
}

impl UploadPolicy {
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Check a file name's extension against the allowed containers.
    pub fn check_format(&self, file_name: &str) -> Result<(), UploadViolation> {
        let ext = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();

        if ext.is_empty() || !self.allowed_extensions.iter().any(|a| a == &ext) {
            return Err(UploadViolation::UnsupportedFormat(file_name.to_string()));
        }
        Ok(())
    }

    pub fn check_size(&self, size: u64) -> Result<(), UploadViolation> {
        if size > self.max_bytes {
            return Err(UploadViolation::TooLarge {
                size,
                max: self.max_bytes,
            });
        }
        Ok(())
    }

    /// Full check of a stored video: reference shape, container and size.
    pub fn check(&self, video_ref: &str, size: u64) -> Result<(), UploadViolation> {
        validate_video_ref(video_ref)?;
        self.check_format(video_ref)?;
        self.check_size(size)
    }
}
