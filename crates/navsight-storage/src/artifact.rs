//! Artifact store seam used by the pipeline and the API.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use navsight_models::JobId;

use crate::client::{ObjectInfo, R2Client};
use crate::error::StorageResult;
use crate::keys::{audio_key, video_key};

/// Durable blob storage addressed by owner, video reference and job.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Metadata of a source video, or `None` if it is not stored.
    async fn stat_video(&self, owner_id: &str, video_ref: &str) -> StorageResult<Option<ObjectInfo>>;

    /// Copy a source video to a local path.
    async fn fetch_video(&self, owner_id: &str, video_ref: &str, dest: &Path) -> StorageResult<()>;

    /// Persist narration audio for a job and return its locator.
    async fn store_audio(
        &self,
        owner_id: &str,
        job_id: &JobId,
        audio: Vec<u8>,
        extension: &str,
        content_type: &str,
    ) -> StorageResult<String>;

    /// Short-lived download URL for a stored artifact.
    async fn presigned_url(&self, locator: &str, expires_in: Duration) -> StorageResult<String>;

    /// Verify the backing store is reachable.
    async fn check(&self) -> StorageResult<()>;
}

#[async_trait]
impl ArtifactStore for R2Client {
    async fn stat_video(&self, owner_id: &str, video_ref: &str) -> StorageResult<Option<ObjectInfo>> {
        let key = video_key(owner_id, video_ref)?;
        self.stat(&key).await
    }

    async fn fetch_video(&self, owner_id: &str, video_ref: &str, dest: &Path) -> StorageResult<()> {
        let key = video_key(owner_id, video_ref)?;
        self.get_to_file(&key, dest).await?;
        Ok(())
    }

    async fn store_audio(
        &self,
        owner_id: &str,
        job_id: &JobId,
        audio: Vec<u8>,
        extension: &str,
        content_type: &str,
    ) -> StorageResult<String> {
        let key = audio_key(owner_id, job_id, extension)?;
        let size = audio.len();
        self.put(&key, audio, content_type).await?;
        info!(job_id = %job_id, key = %key, bytes = size, "Stored narration audio");
        Ok(key)
    }

    async fn presigned_url(&self, locator: &str, expires_in: Duration) -> StorageResult<String> {
        self.presign(locator, expires_in).await
    }

    async fn check(&self) -> StorageResult<()> {
        self.ping().await
    }
}
