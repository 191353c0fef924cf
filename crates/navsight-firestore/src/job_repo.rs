//! Job repository for `VideoJob` records.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use navsight_models::{DetectedObjects, JobId, JobStatus, VideoJob};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_precondition_conflict;
use crate::types::{Document, ToFirestoreValue, Value};

/// Top-level collection holding one document per job.
pub const JOBS_COLLECTION: &str = "narration_jobs";

/// Fields a status transition may rewrite. Identity fields and the
/// withdrawal flag are owned by other writers and never masked in.
const TRANSITION_MASK: &[&str] = &[
    "status",
    "detected_objects",
    "narration_text",
    "audio_ref",
    "error",
    "frames_sampled",
    "frames_failed",
    "processing_time_ms",
    "updated_at",
    "started_at",
    "completed_at",
    "last_heartbeat",
];

const HEARTBEAT_MASK: &[&str] = &["last_heartbeat"];

const WITHDRAW_MASK: &[&str] = &["withdraw_requested", "updated_at"];

const MAX_WRITE_ATTEMPTS: u32 = 5;

/// Result of a withdrawal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawOutcome {
    /// The flag is set; the worker fails the job at its next barrier check.
    Requested,
    /// The job already finished and cannot be withdrawn.
    AlreadyTerminal,
    NotFound,
}

/// Persistence for `VideoJob` records.
///
/// `save_transition` writes the whole transition in one atomic write and only
/// if the stored record is still in `expected`, so readers never observe a
/// half-applied transition and two writers cannot both move the same job.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a new job; fails with `AlreadyExists` on id collision.
    async fn create(&self, job: &VideoJob) -> FirestoreResult<()>;

    async fn get(&self, id: &JobId) -> FirestoreResult<Option<VideoJob>>;

    /// Persist `job` after a transition out of `expected`.
    async fn save_transition(&self, job: &VideoJob, expected: JobStatus) -> FirestoreResult<()>;

    /// Flag a non-terminal job as withdrawn by its owner.
    async fn request_withdraw(&self, id: &JobId) -> FirestoreResult<WithdrawOutcome>;

    /// Stamp `last_heartbeat` on a job that is still `processing`.
    async fn record_heartbeat(&self, id: &JobId) -> FirestoreResult<()>;
}

/// Firestore-backed job repository.
#[derive(Clone)]
pub struct FirestoreJobRepository {
    client: FirestoreClient,
}

impl FirestoreJobRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    async fn load(&self, id: &JobId) -> FirestoreResult<Option<Document>> {
        self.client
            .with_retry("get_job", || self.client.get_document(JOBS_COLLECTION, id.as_str()))
            .await
    }

    async fn backoff(attempt: u32) {
        tokio::time::sleep(Duration::from_millis(50 * (attempt as u64 + 1))).await;
    }
}

#[async_trait]
impl JobRepository for FirestoreJobRepository {
    async fn create(&self, job: &VideoJob) -> FirestoreResult<()> {
        let fields = job_to_fields(job);
        self.client
            .create_document(JOBS_COLLECTION, job.id.as_str(), fields)
            .await?;
        info!(job_id = %job.id, owner_id = %job.owner_id, "Created job record");
        Ok(())
    }

    async fn get(&self, id: &JobId) -> FirestoreResult<Option<VideoJob>> {
        match self.load(id).await? {
            Some(doc) => Ok(Some(document_to_job(&doc, id)?)),
            None => Ok(None),
        }
    }

    async fn save_transition(&self, job: &VideoJob, expected: JobStatus) -> FirestoreResult<()> {
        for attempt in 0..MAX_WRITE_ATTEMPTS {
            let doc = self
                .load(&job.id)
                .await?
                .ok_or_else(|| FirestoreError::not_found(format!("{}/{}", JOBS_COLLECTION, job.id)))?;

            let stored = document_to_job(&doc, &job.id)?;
            if stored.status != expected {
                return Err(FirestoreError::invalid_state(format!(
                    "job {} is {}, expected {}",
                    job.id, stored.status, expected
                )));
            }

            let fields: HashMap<String, Value> = job_to_fields(job)
                .into_iter()
                .filter(|(k, _)| TRANSITION_MASK.contains(&k.as_str()))
                .collect();

            match self
                .client
                .update_document_with_precondition(
                    JOBS_COLLECTION,
                    job.id.as_str(),
                    fields,
                    TRANSITION_MASK,
                    doc.update_time.as_deref(),
                )
                .await
            {
                Ok(_) => {
                    debug!(job_id = %job.id, from = %expected, to = %job.status, "Saved job transition");
                    return Ok(());
                }
                Err(e) if e.is_precondition_failed() => {
                    // A concurrent withdraw touched the record; re-read and retry.
                    record_precondition_conflict("save_transition");
                    debug!(job_id = %job.id, attempt = attempt + 1, "Transition write raced, retrying");
                    Self::backoff(attempt).await;
                }
                Err(e) => return Err(e),
            }
        }

        warn!(job_id = %job.id, "Transition write kept losing races");
        Err(FirestoreError::request_failed(format!(
            "Failed to save transition for job {} after {} attempts",
            job.id, MAX_WRITE_ATTEMPTS
        )))
    }

    async fn request_withdraw(&self, id: &JobId) -> FirestoreResult<WithdrawOutcome> {
        for attempt in 0..MAX_WRITE_ATTEMPTS {
            let Some(doc) = self.load(id).await? else {
                return Ok(WithdrawOutcome::NotFound);
            };

            let stored = document_to_job(&doc, id)?;
            if stored.is_terminal() {
                return Ok(WithdrawOutcome::AlreadyTerminal);
            }
            if stored.withdraw_requested {
                return Ok(WithdrawOutcome::Requested);
            }

            let mut fields = HashMap::new();
            fields.insert("withdraw_requested".to_string(), true.to_firestore_value());
            fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());

            match self
                .client
                .update_document_with_precondition(
                    JOBS_COLLECTION,
                    id.as_str(),
                    fields,
                    WITHDRAW_MASK,
                    doc.update_time.as_deref(),
                )
                .await
            {
                Ok(_) => {
                    info!(job_id = %id, "Withdrawal requested");
                    return Ok(WithdrawOutcome::Requested);
                }
                Err(e) if e.is_precondition_failed() => {
                    record_precondition_conflict("request_withdraw");
                    Self::backoff(attempt).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(FirestoreError::request_failed(format!(
            "Failed to withdraw job {} after {} attempts",
            id, MAX_WRITE_ATTEMPTS
        )))
    }

    async fn record_heartbeat(&self, id: &JobId) -> FirestoreResult<()> {
        for attempt in 0..MAX_WRITE_ATTEMPTS {
            let doc = self
                .load(id)
                .await?
                .ok_or_else(|| FirestoreError::not_found(format!("{}/{}", JOBS_COLLECTION, id)))?;

            let mut job = document_to_job(&doc, id)?;
            if job.status != JobStatus::Processing {
                return Err(FirestoreError::invalid_state(format!("job {} is {}", id, job.status)));
            }
            job.record_heartbeat();

            let mut fields = HashMap::new();
            fields.insert("last_heartbeat".to_string(), job.last_heartbeat.to_firestore_value());

            match self
                .client
                .update_document_with_precondition(
                    JOBS_COLLECTION,
                    id.as_str(),
                    fields,
                    HEARTBEAT_MASK,
                    doc.update_time.as_deref(),
                )
                .await
            {
                Ok(_) => return Ok(()),
                Err(e) if e.is_precondition_failed() => {
                    record_precondition_conflict("record_heartbeat");
                    Self::backoff(attempt).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(FirestoreError::request_failed(format!(
            "Failed to record heartbeat for job {} after {} attempts",
            id, MAX_WRITE_ATTEMPTS
        )))
    }
}

fn job_to_fields(job: &VideoJob) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("job_id".to_string(), job.id.as_str().to_firestore_value());
    fields.insert("owner_id".to_string(), job.owner_id.to_firestore_value());
    fields.insert("source_video_ref".to_string(), job.source_video_ref.to_firestore_value());
    fields.insert("status".to_string(), job.status.as_str().to_firestore_value());
    fields.insert(
        "detected_objects".to_string(),
        job.detected_objects.as_slice().to_vec().to_firestore_value(),
    );
    fields.insert("narration_text".to_string(), job.narration_text.to_firestore_value());
    fields.insert("audio_ref".to_string(), job.audio_ref.to_firestore_value());
    fields.insert("error".to_string(), job.error.to_firestore_value());
    fields.insert("withdraw_requested".to_string(), job.withdraw_requested.to_firestore_value());
    fields.insert("frames_sampled".to_string(), job.frames_sampled.to_firestore_value());
    fields.insert("frames_failed".to_string(), job.frames_failed.to_firestore_value());
    fields.insert("processing_time_ms".to_string(), job.processing_time_ms.to_firestore_value());
    fields.insert("created_at".to_string(), job.created_at.to_firestore_value());
    fields.insert("updated_at".to_string(), job.updated_at.to_firestore_value());
    fields.insert("started_at".to_string(), job.started_at.to_firestore_value());
    fields.insert("completed_at".to_string(), job.completed_at.to_firestore_value());
    fields.insert("last_heartbeat".to_string(), job.last_heartbeat.to_firestore_value());
    fields
}

fn document_to_job(doc: &Document, id: &JobId) -> FirestoreResult<VideoJob> {
    if doc.fields.is_none() {
        return Err(FirestoreError::InvalidResponse(format!("Job {} has no fields", id)));
    }

    let required_string = |key: &str| -> FirestoreResult<String> {
        doc.get::<String>(key)
            .ok_or_else(|| FirestoreError::InvalidResponse(format!("Job {} is missing {}", id, key)))
    };
    let required_time = |key: &str| -> FirestoreResult<DateTime<Utc>> {
        doc.get::<DateTime<Utc>>(key)
            .ok_or_else(|| FirestoreError::InvalidResponse(format!("Job {} is missing {}", id, key)))
    };

    let status: JobStatus = required_string("status")?
        .parse()
        .map_err(|e| FirestoreError::InvalidResponse(format!("Job {}: {}", id, e)))?;

    Ok(VideoJob {
        id: id.clone(),
        owner_id: required_string("owner_id")?,
        source_video_ref: required_string("source_video_ref")?,
        status,
        detected_objects: DetectedObjects::from(doc.get::<Vec<String>>("detected_objects").unwrap_or_default()),
        narration_text: doc.get("narration_text"),
        audio_ref: doc.get("audio_ref"),
        error: doc.get("error"),
        withdraw_requested: doc.get("withdraw_requested").unwrap_or(false),
        frames_sampled: doc.get("frames_sampled").unwrap_or(0),
        frames_failed: doc.get("frames_failed").unwrap_or(0),
        processing_time_ms: doc.get("processing_time_ms"),
        created_at: required_time("created_at")?,
        updated_at: required_time("updated_at")?,
        started_at: doc.get("started_at"),
        completed_at: doc.get("completed_at"),
        last_heartbeat: doc.get("last_heartbeat"),
    })
}
