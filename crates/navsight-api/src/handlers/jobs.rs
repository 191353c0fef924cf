//! Narration job handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use navsight_firestore::WithdrawOutcome;
use navsight_models::{validate_video_ref, JobId, JobStatus, VideoJob};
use navsight_queue::NarrationJob;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    /// Object name of the uploaded video under the caller's prefix
    pub video_ref: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub job_id: String,
    pub status: JobStatus,
}

/// Job as shown to its owner.
#[derive(Debug, Serialize)]
pub struct JobView {
    pub job_id: String,
    pub status: JobStatus,
    pub source_video_ref: String,
    pub detected_objects: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narration_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_ref: Option<String>,
    /// Short-lived download link for the narration audio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub withdraw_requested: bool,
    pub frames_sampled: u32,
    pub frames_failed: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobView {
    fn new(job: VideoJob, audio_url: Option<String>) -> Self {
        Self {
            job_id: job.id.to_string(),
            status: job.status,
            source_video_ref: job.source_video_ref,
            detected_objects: job.detected_objects.into_vec(),
            narration_text: job.narration_text,
            audio_ref: job.audio_ref,
            audio_url,
            error: job.error,
            withdraw_requested: job.withdraw_requested,
            frames_sampled: job.frames_sampled,
            frames_failed: job.frames_failed,
            processing_time_ms: job.processing_time_ms,
            created_at: job.created_at,
            updated_at: job.updated_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WithdrawResponse {
    pub job_id: String,
    pub withdraw_requested: bool,
}

/// POST /api/jobs
///
/// Returns:
/// - 202: job accepted and queued
/// - 400: malformed video reference
/// - 404: no such video under the caller's prefix
/// - 413 / 415: video too large or not an accepted container
pub async fn submit_job(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<SubmitJobRequest>,
) -> ApiResult<(StatusCode, Json<SubmitJobResponse>)> {
    validate_video_ref(&request.video_ref)?;

    let video = state
        .store
        .stat_video(&user.owner_id, &request.video_ref)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("video {}", request.video_ref)))?;

    state
        .config
        .upload_policy()
        .check(&request.video_ref, video.size)?;

    let job = VideoJob::new(&user.owner_id, &request.video_ref);
    state.jobs.create(&job).await?;

    // The record exists before the message, so a worker always finds it.
    let message_id = match state.dispatcher.dispatch(&NarrationJob::for_job(&job)).await {
        Ok(id) => id,
        Err(e) => {
            abandon_unqueued(&state, job, &e.to_string()).await;
            return Err(e.into());
        }
    };

    metrics::record_job_submitted();
    info!(
        job_id = %job.id,
        owner_id = %user.owner_id,
        message_id = %message_id,
        "Accepted narration job for {}",
        request.video_ref
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse {
            job_id: job.id.to_string(),
            status: job.status,
        }),
    ))
}

/// Fail a job whose message never reached the queue, so no record is left
/// `pending` with nothing to pick it up.
async fn abandon_unqueued(state: &AppState, mut job: VideoJob, reason: &str) {
    let result: Result<(), Box<dyn std::error::Error + Send + Sync>> = async {
        job.begin()?;
        state.jobs.save_transition(&job, JobStatus::Pending).await?;
        job.fail(format!("Could not enqueue job: {}", reason))?;
        state.jobs.save_transition(&job, JobStatus::Processing).await?;
        Ok(())
    }
    .await;

    match result {
        Ok(()) => warn!(job_id = %job.id, "Enqueue failed, job marked failed: {}", reason),
        Err(e) => error!(job_id = %job.id, "Enqueue failed and job could not be closed: {}", e),
    }
}

/// Load a job, hiding jobs that belong to someone else.
async fn load_owned_job(state: &AppState, user: &AuthUser, job_id: &str) -> ApiResult<VideoJob> {
    if job_id.is_empty() || job_id.len() > 128 {
        return Err(ApiError::not_found("job"));
    }

    match state.jobs.get(&JobId::from(job_id)).await? {
        Some(job) if job.is_owned_by(&user.owner_id) => Ok(job),
        _ => Err(ApiError::not_found(format!("job {}", job_id))),
    }
}

/// GET /api/jobs/:job_id
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<JobView>> {
    let job = load_owned_job(&state, &user, &job_id).await?;

    let audio_url = match (&job.status, job.audio_ref.as_deref()) {
        (JobStatus::Completed, Some(locator)) => {
            match state.store.presigned_url(locator, state.config.audio_url_ttl).await {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(job_id = %job.id, "Could not presign narration audio: {}", e);
                    None
                }
            }
        }
        _ => None,
    };

    Ok(Json(JobView::new(job, audio_url)))
}

/// POST /api/jobs/:job_id/withdraw
///
/// Returns:
/// - 202: withdrawal recorded; the worker fails the job at its next check
/// - 404: no such job for this caller
/// - 409: job already finished
pub async fn withdraw_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    user: AuthUser,
) -> ApiResult<(StatusCode, Json<WithdrawResponse>)> {
    let job = load_owned_job(&state, &user, &job_id).await?;

    match state.jobs.request_withdraw(&job.id).await? {
        WithdrawOutcome::Requested => {
            metrics::record_job_withdrawn();
            info!(job_id = %job.id, "Withdrawal requested");
            Ok((
                StatusCode::ACCEPTED,
                Json(WithdrawResponse {
                    job_id: job.id.to_string(),
                    withdraw_requested: true,
                }),
            ))
        }
        WithdrawOutcome::AlreadyTerminal => Err(ApiError::conflict(format!("job {} has already finished", job.id))),
        WithdrawOutcome::NotFound => Err(ApiError::not_found(format!("job {}", job.id))),
    }
}
