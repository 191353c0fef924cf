//! In-process job repository for local runs and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use navsight_models::{JobId, JobStatus, VideoJob};

use crate::error::{FirestoreError, FirestoreResult};
use crate::job_repo::{JobRepository, WithdrawOutcome};

/// `JobRepository` over a map behind a lock, with the same transition
/// guard as the Firestore implementation.
#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<JobId, VideoJob>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Snapshot of every stored job.
    pub async fn all(&self) -> Vec<VideoJob> {
        self.jobs.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create(&self, job: &VideoJob) -> FirestoreResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(FirestoreError::AlreadyExists(job.id.to_string()));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, id: &JobId) -> FirestoreResult<Option<VideoJob>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn save_transition(&self, job: &VideoJob, expected: JobStatus) -> FirestoreResult<()> {
        let mut jobs = self.jobs.write().await;
        let stored = jobs
            .get_mut(&job.id)
            .ok_or_else(|| FirestoreError::not_found(job.id.to_string()))?;

        if stored.status != expected {
            return Err(FirestoreError::invalid_state(format!(
                "job {} is {}, expected {}",
                job.id, stored.status, expected
            )));
        }

        let withdraw_requested = stored.withdraw_requested;
        let last_heartbeat = stored.last_heartbeat.max(job.last_heartbeat);
        *stored = job.clone();
        stored.withdraw_requested = withdraw_requested;
        stored.last_heartbeat = last_heartbeat;
        Ok(())
    }

    async fn request_withdraw(&self, id: &JobId) -> FirestoreResult<WithdrawOutcome> {
        let mut jobs = self.jobs.write().await;
        let Some(stored) = jobs.get_mut(id) else {
            return Ok(WithdrawOutcome::NotFound);
        };
        if stored.is_terminal() {
            return Ok(WithdrawOutcome::AlreadyTerminal);
        }
        stored.withdraw_requested = true;
        stored.updated_at = Utc::now();
        Ok(WithdrawOutcome::Requested)
    }

    async fn record_heartbeat(&self, id: &JobId) -> FirestoreResult<()> {
        let mut jobs = self.jobs.write().await;
        let stored = jobs
            .get_mut(id)
            .ok_or_else(|| FirestoreError::not_found(id.to_string()))?;
        if stored.status != JobStatus::Processing {
            return Err(FirestoreError::invalid_state(format!("job {} is {}", id, stored.status)));
        }
        stored.record_heartbeat();
        Ok(())
    }
}
