//! Cloudflare R2 artifact storage.
//!
//! This crate provides:
//! - The R2 bucket client: PUT, GET to file, HEAD, presigned GET
//! - The object key layout for source videos and narration audio
//! - The `ArtifactStore` seam used by the pipeline and the API

pub mod artifact;
pub mod client;
pub mod error;
pub mod keys;

pub use artifact::ArtifactStore;
pub use client::{ObjectInfo, R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use keys::{audio_key, video_key};
