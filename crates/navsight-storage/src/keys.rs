//! Object key layout.
//!
//! ```text
//! videos/{owner_id}/{video_ref}
//! audio-narrations/{owner_id}/{job_id}.{ext}
//! ```

use navsight_models::{validate_video_ref, JobId};

use crate::error::{StorageError, StorageResult};

pub const VIDEO_PREFIX: &str = "videos";
pub const AUDIO_PREFIX: &str = "audio-narrations";

fn check_segment(kind: &str, value: &str) -> StorageResult<()> {
    if value.is_empty()
        || value.contains('/')
        || value.contains('\\')
        || value.contains("..")
        || value.chars().any(char::is_control)
    {
        return Err(StorageError::invalid_key(format!("invalid {}: {:?}", kind, value)));
    }
    Ok(())
}

/// Key of a source video under its owner's prefix.
pub fn video_key(owner_id: &str, video_ref: &str) -> StorageResult<String> {
    check_segment("owner id", owner_id)?;
    validate_video_ref(video_ref).map_err(|e| StorageError::invalid_key(e.to_string()))?;
    Ok(format!("{}/{}/{}", VIDEO_PREFIX, owner_id, video_ref))
}

/// Key of a job's narration audio.
pub fn audio_key(owner_id: &str, job_id: &JobId, extension: &str) -> StorageResult<String> {
    check_segment("owner id", owner_id)?;
    check_segment("job id", job_id.as_str())?;
    check_segment("extension", extension)?;
    Ok(format!("{}/{}/{}.{}", AUDIO_PREFIX, owner_id, job_id, extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_key() {
        assert_eq!(video_key("user_1", "walk.mp4").unwrap(), "videos/user_1/walk.mp4");
        assert!(video_key("user_1", "../user_2/walk.mp4").is_err());
        assert!(video_key("user/1", "walk.mp4").is_err());
        assert!(video_key("", "walk.mp4").is_err());
    }

    #[test]
    fn test_audio_key() {
        let job_id = JobId::from("job-123");
        assert_eq!(
            audio_key("user_1", &job_id, "mp3").unwrap(),
            "audio-narrations/user_1/job-123.mp3"
        );
        assert!(audio_key("user_1", &JobId::from("a/b"), "mp3").is_err());
    }
}
