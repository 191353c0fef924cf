//! FFprobe video information.

use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Video file information.
#[derive(Debug, Clone)]
pub struct VideoInfo {
    /// Duration in seconds, 0 when unknown
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    /// Video codec
    pub codec: String,
    /// Container format name as reported by ffprobe
    pub format_name: String,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

/// Probe a video file for information.
///
/// Fails with [`MediaError::UnsupportedMedia`] when ffprobe cannot read the
/// container, the container has no video stream, or that stream has no
/// picture size.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::unsupported_media(format!(
            "container could not be read: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(stdout: &[u8]) -> MediaResult<VideoInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)
        .map_err(|e| MediaError::unsupported_media(format!("unreadable probe output: {}", e)))?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::unsupported_media("No video stream found"))?;

    // Container duration first, then the stream's own.
    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .or(video_stream.duration.as_ref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0);

    let (width, height) = match (video_stream.width, video_stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(MediaError::unsupported_media("video stream has no picture size")),
    };

    Ok(VideoInfo {
        duration,
        width,
        height,
        codec: video_stream.codec_name.clone().unwrap_or_default(),
        format_name: probe
            .format
            .and_then(|f| f.format_name)
            .unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output() {
        let json = br#"{
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
                 "avg_frame_rate": "30000/1001", "r_frame_rate": "30/1"}
            ],
            "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "12.480000"}
        }"#;

        let info = parse_probe_output(json).unwrap();
        assert!((info.duration - 12.48).abs() < 1e-6);
        assert_eq!((info.width, info.height), (1920, 1080));
        assert_eq!(info.codec, "h264");
        assert!(info.format_name.contains("mp4"));
    }

    #[test]
    fn test_stream_without_picture_size_is_unsupported() {
        let json = br#"{
            "streams": [{"codec_type": "video", "codec_name": "mjpeg", "width": 0, "height": 0}],
            "format": {"format_name": "avi", "duration": "2.0"}
        }"#;

        let err = parse_probe_output(json).unwrap_err();
        assert!(err.to_string().contains("picture size"));
        assert!(err.is_unsupported_media());
    }

    #[test]
    fn test_audio_only_is_unsupported() {
        let json = br#"{
            "streams": [{"codec_type": "audio", "codec_name": "mp3"}],
            "format": {"format_name": "mp3", "duration": "3.0"}
        }"#;

        let err = parse_probe_output(json).unwrap_err();
        assert!(matches!(err, MediaError::UnsupportedMedia(_)));
    }

    #[test]
    fn test_stream_duration_fallback() {
        let json = br#"{
            "streams": [{"codec_type": "video", "width": 640, "height": 360, "duration": "4.5"}],
            "format": {"format_name": "matroska,webm"}
        }"#;

        let info = parse_probe_output(json).unwrap();
        assert!((info.duration - 4.5).abs() < 1e-6);
    }

    #[test]
    fn test_garbage_output_is_unsupported() {
        let err = parse_probe_output(b"not json").unwrap_err();
        assert!(err.is_unsupported_media());
    }
}
