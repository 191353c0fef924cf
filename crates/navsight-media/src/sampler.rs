//! Frame sampling.
//!
//! A video is reduced to a bounded, ordered sequence of JPEG frames taken at
//! a fixed cadence. Sampling is deterministic: the same video and config
//! always produce the same timestamps.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use navsight_models::Frame;

use crate::command::{run_ffmpeg, FrameGrab};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_video;

/// Frame sampler configuration.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Seconds between sampled frames
    pub interval_secs: f64,
    /// Upper bound on frames per video
    pub max_frames: usize,
    /// Frames are scaled down to at most this width
    pub frame_width: u32,
    /// Per-frame FFmpeg timeout
    pub extract_timeout_secs: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 2.0,
            max_frames: 15,
            frame_width: 768,
            extract_timeout_secs: 30,
        }
    }
}

impl SamplerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            interval_secs: std::env::var("SAMPLER_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|v| v.is_finite() && *v > 0.0)
                .unwrap_or(defaults.interval_secs),
            max_frames: std::env::var("SAMPLER_MAX_FRAMES")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.max_frames),
            frame_width: std::env::var("SAMPLER_FRAME_WIDTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.frame_width),
            extract_timeout_secs: std::env::var("SAMPLER_EXTRACT_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.extract_timeout_secs),
        }
    }
}

/// Compute the sample timestamps for a video of `duration` seconds.
///
/// Frames are taken every `interval` seconds starting at 0. When that would
/// exceed `max_frames`, the cadence is stretched so the samples still span
/// the whole video. Videos shorter than one interval (or of unknown length)
/// yield a single timestamp at 0.
pub fn plan_timestamps(duration: f64, interval: f64, max_frames: usize) -> Vec<f64> {
    let max_frames = max_frames.max(1);
    if !duration.is_finite() || !interval.is_finite() || interval <= 0.0 || duration <= interval {
        return vec![0.0];
    }

    let natural = (duration / interval).ceil() as usize;
    let (count, step) = if natural > max_frames {
        (max_frames, duration / max_frames as f64)
    } else {
        (natural, interval)
    };

    (0..count)
        .map(|i| i as f64 * step)
        .filter(|t| *t < duration)
        .collect()
}

/// Source of sampled frames for a video file.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Sample `video` into frames ordered by increasing timestamp.
    ///
    /// `work_dir` holds intermediate files and is owned by the caller.
    async fn sample(&self, video: &Path, work_dir: &Path) -> MediaResult<Vec<Frame>>;
}

/// FFmpeg-backed frame sampler.
#[derive(Debug, Clone, Default)]
pub struct FfmpegFrameSampler {
    config: SamplerConfig,
}

impl FfmpegFrameSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    fn frame_grab(&self, video: &Path, output: &Path, timestamp: f64) -> FrameGrab {
        FrameGrab::new(video, output, timestamp).max_width(self.config.frame_width)
    }

    async fn extract_frame(&self, video: &Path, output: &Path, timestamp: f64) -> MediaResult<Option<Frame>> {
        let grab = self.frame_grab(video, output, timestamp);
        run_ffmpeg(
            &grab.args(),
            Duration::from_secs(self.config.extract_timeout_secs),
        )
        .await?;

        // Seeking past the last decodable frame exits cleanly but writes nothing.
        match tokio::fs::read(output).await {
            Ok(image) if !image.is_empty() => Ok(Some(Frame::new(timestamp, image))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSampler {
    async fn sample(&self, video: &Path, work_dir: &Path) -> MediaResult<Vec<Frame>> {
        let info = probe_video(video).await?;
        let timestamps = plan_timestamps(
            info.duration,
            self.config.interval_secs,
            self.config.max_frames,
        );

        info!(
            video = %video.display(),
            duration = info.duration,
            codec = %info.codec,
            container = %info.format_name,
            width = info.width,
            height = info.height,
            planned = timestamps.len(),
            "Sampling frames"
        );

        tokio::fs::create_dir_all(work_dir).await?;

        let mut frames = Vec::with_capacity(timestamps.len());
        for (index, timestamp) in timestamps.into_iter().enumerate() {
            let output = work_dir.join(format!("frame_{:04}.jpg", index));
            match self.extract_frame(video, &output, timestamp).await {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => debug!(timestamp, "No frame decoded at timestamp"),
                // The first frame must decode; later misses only shorten the sequence.
                Err(MediaError::FfmpegFailed { stderr, .. }) if index == 0 => {
                    return Err(MediaError::unsupported_media(format!(
                        "first frame could not be decoded: {}",
                        stderr.unwrap_or_default()
                    )));
                }
                Err(MediaError::FfmpegFailed { stderr, .. }) => {
                    warn!(timestamp, stderr = ?stderr, "Frame extraction failed, skipping");
                }
                Err(e) => return Err(e),
            }
        }

        if frames.is_empty() {
            return Err(MediaError::unsupported_media("no decodable frames"));
        }

        Ok(frames)
    }
}
