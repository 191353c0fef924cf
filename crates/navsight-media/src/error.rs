//! Media errors.

use std::path::PathBuf;

use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("ffmpeg is not installed")]
    FfmpegNotFound,

    #[error("ffprobe is not installed")]
    FfprobeNotFound,

    #[error("ffmpeg failed ({message})")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    /// The file is not a decodable container with a video stream.
    #[error("Unsupported media: {0}")]
    UnsupportedMedia(String),

    #[error("Video file missing: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("ffmpeg killed after {0}s")]
    Timeout(u64),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MediaError {
    pub fn ffmpeg_failed(message: impl Into<String>, stderr: Option<String>, exit_code: Option<i32>) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn unsupported_media(message: impl Into<String>) -> Self {
        Self::UnsupportedMedia(message.into())
    }

    /// True when the input file is at fault rather than the host.
    pub fn is_unsupported_media(&self) -> bool {
        matches!(self, MediaError::UnsupportedMedia(_) | MediaError::FileNotFound(_))
    }
}
