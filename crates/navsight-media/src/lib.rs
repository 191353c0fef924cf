//! FFmpeg CLI wrapper and frame sampling.
//!
//! This crate provides:
//! - Single-frame ffmpeg extraction with a kill-on-timeout runner
//! - FFprobe container inspection
//! - The frame sampler that turns a video into ordered JPEG frames

pub mod command;
pub mod error;
pub mod probe;
pub mod sampler;

pub use command::{check_ffmpeg, check_ffprobe, run_ffmpeg, FrameGrab};
pub use error::{MediaError, MediaResult};
pub use probe::{probe_video, VideoInfo};
pub use sampler::{plan_timestamps, FfmpegFrameSampler, FrameSource, SamplerConfig};
