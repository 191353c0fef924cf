//! Shared data models for the navsight narration pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Video jobs and their forward-only status machine
//! - Sampled frames and per-frame detections
//! - Label normalization and the deduplicated detection set
//! - The narration lexicon (label to safety sentence)
//! - Upload constraints for source videos

pub mod error;
pub mod frame;
pub mod job;
pub mod labels;
pub mod lexicon;
pub mod upload;

pub use error::{ModelError, ModelResult};
pub use frame::{Detection, Frame};
pub use job::{JobId, JobStatus, NarrationOutcome, VideoJob};
pub use labels::{normalize_label, DetectedObjects};
pub use lexicon::NarrationLexicon;
pub use upload::{validate_video_ref, UploadPolicy, UploadViolation};
