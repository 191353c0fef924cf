//! S3-compatible bucket client (Cloudflare R2).

use std::path::Path;
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Bucket coordinates and credentials. `Debug` leaves the keys out.
#[derive(Clone)]
pub struct R2Config {
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    /// "auto" for R2
    pub region: String,
}

impl std::fmt::Debug for R2Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("R2Config")
            .field("endpoint_url", &self.endpoint_url)
            .field("bucket_name", &self.bucket_name)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

fn required(name: &str) -> StorageResult<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| StorageError::config_error(format!("{} must be set", name)))
}

impl R2Config {
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: required("R2_ENDPOINT_URL")?,
            access_key_id: required("R2_ACCESS_KEY_ID")?,
            secret_access_key: required("R2_SECRET_ACCESS_KEY")?,
            bucket_name: required("R2_BUCKET_NAME")?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
        })
    }
}

/// HEAD result for an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
}

#[derive(Clone)]
pub struct R2Client {
    client: Client,
    bucket: String,
}

impl R2Client {
    pub async fn new(config: R2Config) -> StorageResult<Self> {
        let credentials = Credentials::new(config.access_key_id, config.secret_access_key, None, None, "r2");
        let conf = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            // R2 does not serve virtual-hosted bucket names on custom endpoints.
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: config.bucket_name,
        })
    }

    pub async fn from_env() -> StorageResult<Self> {
        Self::new(R2Config::from_env()?).await
    }

    pub async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> StorageResult<()> {
        debug!(key, bytes = body.len(), "PUT object");
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map(|_| ())
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", key, e)))
    }

    /// Stream `key` into `dest`, creating parent directories.
    pub async fn get_to_file(&self, key: &str, dest: &Path) -> StorageResult<u64> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(se) if se.is_no_such_key() => StorageError::not_found(key),
                _ => StorageError::download_failed(format!("{}: {}", key, e)),
            })?;

        if let Some(dir) = dest.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let mut file = tokio::fs::File::create(dest).await?;
        let mut body = object.body.into_async_read();
        let copied = tokio::io::copy(&mut body, &mut file)
            .await
            .map_err(|e| StorageError::download_failed(format!("{}: {}", key, e)))?;
        file.flush().await?;

        debug!(key, bytes = copied, dest = %dest.display(), "GET object");
        Ok(copied)
    }

    /// `None` when nothing is stored under `key`.
    pub async fn stat(&self, key: &str) -> StorageResult<Option<ObjectInfo>> {
        let head = self.client.head_object().bucket(&self.bucket).key(key).send().await;
        match head {
            Ok(head) => Ok(Some(ObjectInfo {
                key: key.to_string(),
                size: u64::try_from(head.content_length().unwrap_or(0)).unwrap_or(0),
                content_type: head.content_type().map(str::to_string),
            })),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(None),
            Err(e) => Err(StorageError::AwsSdk(format!("HEAD {}: {}", key, e))),
        }
    }

    pub async fn presign(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let config = PresigningConfig::expires_in(expires_in).map_err(|e| StorageError::PresignFailed(e.to_string()))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;
        Ok(request.uri().to_string())
    }

    /// HEAD the bucket itself.
    pub async fn ping(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| StorageError::AwsSdk(format!("bucket {} unreachable: {}", self.bucket, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_requires_endpoint() {
        std::env::set_var("R2_ENDPOINT_URL", "  ");
        let err = R2Config::from_env().unwrap_err();
        std::env::remove_var("R2_ENDPOINT_URL");
        assert!(err.to_string().contains("R2_ENDPOINT_URL"));
    }

    #[test]
    fn test_config_debug_hides_secrets() {
        let config = R2Config {
            endpoint_url: "https://acct.r2.cloudflarestorage.com".to_string(),
            access_key_id: "AKID".to_string(),
            secret_access_key: "very-secret".to_string(),
            bucket_name: "navsight".to_string(),
            region: "auto".to_string(),
        };
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains("AKID"));
        assert!(rendered.contains("navsight"));
    }
}
