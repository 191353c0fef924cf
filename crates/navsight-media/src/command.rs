//! Single-frame extraction through the ffmpeg CLI.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Arguments for grabbing one JPEG frame at a given offset.
#[derive(Debug, Clone)]
pub struct FrameGrab {
    video: PathBuf,
    output: PathBuf,
    at_secs: f64,
    max_width: Option<u32>,
    quality: u8,
}

impl FrameGrab {
    pub fn new(video: impl Into<PathBuf>, output: impl Into<PathBuf>, at_secs: f64) -> Self {
        Self {
            video: video.into(),
            output: output.into(),
            at_secs: at_secs.max(0.0),
            max_width: None,
            quality: 3,
        }
    }

    /// Downscale wider frames, keeping the aspect ratio. Narrower frames are
    /// left alone.
    pub fn max_width(mut self, width: u32) -> Self {
        self.max_width = (width > 0).then_some(width);
        self
    }

    /// mjpeg `-q:v`, 2 (best) to 31.
    pub fn quality(mut self, q: u8) -> Self {
        self.quality = q.clamp(2, 31);
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn args(&self) -> Vec<String> {
        // Input-side -ss seeks by keyframe index instead of decoding up to the offset.
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-v".into(),
            "error".into(),
            "-ss".into(),
            format!("{:.3}", self.at_secs),
            "-i".into(),
            self.video.to_string_lossy().into_owned(),
            "-frames:v".into(),
            "1".into(),
        ];
        if let Some(width) = self.max_width {
            args.push("-vf".into());
            args.push(format!("scale='min({},iw)':-2", width));
        }
        args.push("-q:v".into());
        args.push(self.quality.to_string());
        args.push(self.output.to_string_lossy().into_owned());
        args
    }
}

/// Run ffmpeg with `args`, killing it if it outlives `limit`.
pub async fn run_ffmpeg(args: &[String], limit: Duration) -> MediaResult<()> {
    check_ffmpeg()?;
    debug!(args = %args.join(" "), "ffmpeg");

    let child = Command::new("ffmpeg")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    // On timeout the dropped future takes the child with it.
    let output = tokio::time::timeout(limit, child.wait_with_output())
        .await
        .map_err(|_| {
            warn!(limit_secs = limit.as_secs(), "ffmpeg overran its time limit");
            MediaError::Timeout(limit.as_secs())
        })??;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(MediaError::ffmpeg_failed(
        format!("exit status {}", output.status),
        (!stderr.is_empty()).then_some(stderr),
        output.status.code(),
    ))
}

pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}
