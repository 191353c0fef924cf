//! Sampled frames and the detections produced for them.
//!
//! Both types live only for the duration of one pipeline run and are never
//! persisted.

use std::fmt;

/// A still image extracted from the source video.
#[derive(Clone, PartialEq)]
pub struct Frame {
    /// Offset of the frame within the source video, in seconds.
    pub timestamp_secs: f64,
    /// JPEG-encoded image bytes.
    pub image: Vec<u8>,
}

impl Frame {
    pub fn new(timestamp_secs: f64, image: Vec<u8>) -> Self {
        Self {
            timestamp_secs,
            image,
        }
    }
}

// Image bytes are elided so frames can be logged.
impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("timestamp_secs", &self.timestamp_secs)
            .field("image_bytes", &self.image.len())
            .finish()
    }
}

/// One object label observed in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub timestamp_secs: f64,
    pub label: String,
}

impl Detection {
    pub fn new(timestamp_secs: f64, label: impl Into<String>) -> Self {
        Self {
            timestamp_secs,
            label: label.into(),
        }
    }
}
