//! Application state.

use std::sync::Arc;

use async_trait::async_trait;

use navsight_firestore::{FirestoreClient, FirestoreJobRepository, JobRepository};
use navsight_queue::{JobQueue, NarrationJob, QueueResult};
use navsight_storage::{ArtifactStore, R2Client};

use crate::auth::JwtVerifier;
use crate::config::ApiConfig;

/// Hands accepted jobs to the workers.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, job: &NarrationJob) -> QueueResult<String>;

    /// Round-trip to the broker for readiness checks.
    async fn check(&self) -> QueueResult<()>;
}

#[async_trait]
impl JobDispatcher for JobQueue {
    async fn dispatch(&self, job: &NarrationJob) -> QueueResult<String> {
        self.enqueue(job).await
    }

    async fn check(&self) -> QueueResult<()> {
        JobQueue::check(self).await
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn ArtifactStore>,
    pub jobs: Arc<dyn JobRepository>,
    pub dispatcher: Arc<dyn JobDispatcher>,
    pub verifier: Arc<JwtVerifier>,
}

impl AppState {
    /// Connect to storage, Firestore and Redis from the environment.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        if config.is_production() && config.auth.hs256_secret.is_some() {
            anyhow::bail!("AUTH_HS256_SECRET is for local development and must not be set in production");
        }

        let storage = R2Client::from_env().await?;
        let firestore = FirestoreClient::from_env().await?;
        let queue = JobQueue::from_env()?;
        queue.init().await?;

        let verifier = JwtVerifier::new(config.auth.clone());

        Ok(Self::from_parts(
            config,
            Arc::new(storage),
            Arc::new(FirestoreJobRepository::new(firestore)),
            Arc::new(queue),
            verifier,
        ))
    }

    pub fn from_parts(
        config: ApiConfig,
        store: Arc<dyn ArtifactStore>,
        jobs: Arc<dyn JobRepository>,
        dispatcher: Arc<dyn JobDispatcher>,
        verifier: JwtVerifier,
    ) -> Self {
        Self {
            config,
            store,
            jobs,
            dispatcher,
            verifier: Arc::new(verifier),
        }
    }
}
