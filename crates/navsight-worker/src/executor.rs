//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use navsight_firestore::FirestoreError;
use navsight_models::JobStatus;
use navsight_queue::{Delivery, JobQueue};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::orchestrator::Orchestrator;

/// Pulls narration jobs off the queue and runs them through the
/// orchestrator, at most `max_concurrent_jobs` at a time.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    orchestrator: Arc<Orchestrator>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, queue: JobQueue, orchestrator: Orchestrator) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            orchestrator: Arc::new(orchestrator),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Run until [`shutdown`](Self::shutdown) is signalled, then wait for
    /// in-flight jobs up to the shutdown timeout.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            consumer = %self.consumer_name,
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            "Starting narration job executor"
        );

        self.queue.init().await?;
        match self.queue.len().await {
            Ok(backlog) => info!(backlog, "Job stream ready"),
            Err(e) => warn!("Could not read job stream length: {}", e),
        }

        let mut shutdown_rx = self.shutdown.subscribe();
        let claim_task = self.spawn_claim_task();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "In-flight jobs still running after {:?}; they will be reclaimed",
                self.config.shutdown_timeout
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Periodically take over messages whose consumer died mid-job.
    fn spawn_claim_task(&self) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let orchestrator = Arc::clone(&self.orchestrator);
        let semaphore = Arc::clone(&self.job_semaphore);
        let consumer_name = self.consumer_name.clone();
        let claim_interval = self.config.claim_interval;
        let min_idle_ms = self.config.claim_min_idle.as_millis() as u64;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match queue.claim_pending(&consumer_name, min_idle_ms, 5).await {
                            Ok(deliveries) if !deliveries.is_empty() => {
                                info!("Claimed {} pending jobs", deliveries.len());
                                for delivery in deliveries {
                                    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                        break;
                                    };
                                    let queue = Arc::clone(&queue);
                                    let orchestrator = Arc::clone(&orchestrator);
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_job(orchestrator, queue, delivery).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => warn!("Failed to claim pending jobs: {}", e),
                        }
                    }
                }
            }
        })
    }

    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let deliveries = self
            .queue
            .consume(&self.consumer_name, 1000, available.min(5))
            .await?;

        if deliveries.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", deliveries.len());

        for delivery in deliveries {
            let orchestrator = Arc::clone(&self.orchestrator);
            let queue = Arc::clone(&self.queue);
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::config("job semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(orchestrator, queue, delivery).await;
            });
        }

        Ok(())
    }

    async fn execute_job(orchestrator: Arc<Orchestrator>, queue: Arc<JobQueue>, delivery: Delivery) {
        let job_id = delivery.job.job_id.clone();
        debug!(job_id = %job_id, redelivered = delivery.redelivered, "Executing job");

        let result = orchestrator.run(&job_id, delivery.redelivered).await;
        match &result {
            Ok(status) => debug!(job_id = %job_id, status = %status, "Job run finished"),
            Err(e) => error!(job_id = %job_id, "Job run failed: {}", e),
        }

        if should_ack(&result) {
            if let Err(e) = queue.ack(&delivery.message_id).await {
                error!(job_id = %job_id, "Failed to ack job: {}", e);
            }
        } else {
            warn!(job_id = %job_id, "Leaving message pending for redelivery");
        }
    }

    async fn wait_for_jobs(&self) {
        loop {
            let available = self.job_semaphore.available_permits();
            if available == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// A message is acked once the run is settled. A job another worker is
/// still running, or a job repository outage, leaves it pending so a later
/// claim can finish or fail the job.
fn should_ack(result: &WorkerResult<JobStatus>) -> bool {
    match result {
        Ok(JobStatus::Processing) => false,
        Ok(_) => true,
        Err(WorkerError::Repository(FirestoreError::NotFound(_))) => true,
        Err(WorkerError::Repository(_)) => false,
        Err(_) => true,
    }
}
