//! Video job records and their status machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{ModelError, ModelResult};
use crate::labels::DetectedObjects;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Submitted, waiting for a worker
    #[default]
    Pending,
    /// A worker is running the pipeline
    Processing,
    /// Narration and audio are stored
    Completed,
    /// An unrecoverable step failed
    Failed,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `self -> next` is a legal forward transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Everything the pipeline produces for a successful run.
#[derive(Debug, Clone)]
pub struct NarrationOutcome {
    pub detected_objects: DetectedObjects,
    pub narration_text: String,
    pub audio_ref: String,
    pub frames_sampled: u32,
    pub frames_failed: u32,
}

/// One request to turn a stored video into narration and audio.
///
/// The record only moves forward: `pending -> processing -> completed | failed`.
/// The transition methods enforce that and the result invariants; callers
/// persist the whole record after each transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoJob {
    pub id: JobId,
    pub owner_id: String,
    /// Opaque reference to the source video under the owner's prefix
    pub source_video_ref: String,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub detected_objects: DetectedObjects,
    #[serde(default)]
    pub narration_text: Option<String>,
    /// Artifact-store key of the synthesized audio
    #[serde(default)]
    pub audio_ref: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    /// Set by the owner to withdraw a job that has not finished yet
    #[serde(default)]
    pub withdraw_requested: bool,
    #[serde(default)]
    pub frames_sampled: u32,
    #[serde(default)]
    pub frames_failed: u32,
    #[serde(default)]
    pub processing_time_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Last time the worker running this job reported it was alive
    #[serde(default)]
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl VideoJob {
    /// Create a new pending job.
    pub fn new(owner_id: impl Into<String>, source_video_ref: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            owner_id: owner_id.into(),
            source_video_ref: source_video_ref.into(),
            status: JobStatus::Pending,
            detected_objects: DetectedObjects::new(),
            narration_text: None,
            audio_ref: None,
            error: None,
            withdraw_requested: false,
            frames_sampled: 0,
            frames_failed: 0,
            processing_time_ms: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            last_heartbeat: None,
        }
    }

    fn transition(&mut self, next: JobStatus) -> ModelResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ModelError::invalid_transition(self.status, next));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// `pending -> processing`.
    pub fn begin(&mut self) -> ModelResult<()> {
        self.transition(JobStatus::Processing)?;
        self.started_at = Some(self.updated_at);
        self.last_heartbeat = Some(self.updated_at);
        Ok(())
    }

    /// `processing -> completed`. Rejects an empty narration or audio ref.
    pub fn complete(&mut self, outcome: NarrationOutcome) -> ModelResult<()> {
        if outcome.narration_text.trim().is_empty() {
            return Err(ModelError::incomplete_result("narration text is empty"));
        }
        if outcome.audio_ref.trim().is_empty() {
            return Err(ModelError::incomplete_result("audio reference is empty"));
        }

        self.transition(JobStatus::Completed)?;
        self.detected_objects = outcome.detected_objects;
        self.narration_text = Some(outcome.narration_text);
        self.audio_ref = Some(outcome.audio_ref);
        self.frames_sampled = outcome.frames_sampled;
        self.frames_failed = outcome.frames_failed;
        self.error = None;
        self.finish();
        Ok(())
    }

    /// `processing -> failed`, recording the error text verbatim.
    pub fn fail(&mut self, error: impl Into<String>) -> ModelResult<()> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error.into());
        self.audio_ref = None;
        self.finish();
        Ok(())
    }

    fn finish(&mut self) {
        self.completed_at = Some(self.updated_at);
        self.processing_time_ms = self.started_at.map(|started| {
            (self.updated_at - started).num_milliseconds().max(0) as u64
        });
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Update heartbeat timestamp.
    pub fn record_heartbeat(&mut self) {
        self.last_heartbeat = Some(Utc::now());
    }

    /// Whether a `processing` job has gone quiet for longer than
    /// `threshold`. Records written before heartbeats existed fall back to
    /// `started_at`, then `updated_at`.
    pub fn is_stale(&self, threshold: Duration) -> bool {
        if self.status != JobStatus::Processing {
            return false;
        }
        let last_sign = self.last_heartbeat.or(self.started_at).unwrap_or(self.updated_at);
        match chrono::Duration::from_std(threshold) {
            Ok(threshold) => Utc::now() - last_sign > threshold,
            Err(_) => false,
        }
    }

    pub fn is_owned_by(&self, owner_id: &str) -> bool {
        self.owner_id == owner_id
    }
}
