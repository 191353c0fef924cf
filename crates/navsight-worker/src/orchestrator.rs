//! Pipeline orchestrator.
//!
//! Drives one `VideoJob` through `pending -> processing -> completed | failed`:
//! fetch the source video, sample frames, classify every frame concurrently,
//! join at a single barrier, compose the narration, synthesize audio, store
//! it, and persist the terminal record. Each transition is one guarded write
//! through the `JobRepository`.

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn, Instrument};

use navsight_firestore::{FirestoreError, JobRepository};
use navsight_media::FrameSource;
use navsight_models::{Detection, DetectedObjects, Frame, JobId, JobStatus, NarrationLexicon, NarrationOutcome, VideoJob};
use navsight_storage::ArtifactStore;

use crate::classifier::ObjectClassifier;
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics::record_job;
use crate::narration::compose;
use crate::synthesizer::SpeechSynthesizer;

/// Collaborators the pipeline runs against.
#[derive(Clone)]
pub struct PipelineDeps {
    pub frames: Arc<dyn FrameSource>,
    pub classifier: ObjectClassifier,
    pub synthesizer: SpeechSynthesizer,
    pub store: Arc<dyn ArtifactStore>,
    pub jobs: Arc<dyn JobRepository>,
    pub lexicon: Arc<NarrationLexicon>,
}

/// Classification result of one frame, known at the barrier.
struct FrameResult {
    timestamp_secs: f64,
    labels: WorkerResult<DetectedObjects>,
}

pub struct Orchestrator {
    deps: PipelineDeps,
    max_classify_parallel: usize,
    work_dir: PathBuf,
    heartbeat_interval: Duration,
    stale_after: Duration,
}

impl Orchestrator {
    pub fn new(deps: PipelineDeps, config: &WorkerConfig) -> Self {
        Self {
            deps,
            max_classify_parallel: config.max_classify_parallel.max(1),
            work_dir: config.work_dir.clone(),
            heartbeat_interval: config.job_heartbeat_interval,
            stale_after: config.job_stale_after,
        }
    }

    /// Run a job to a terminal state and return that state.
    ///
    /// Terminal jobs are left untouched. A job found in `processing` on a
    /// redelivered message is failed as interrupted only once its heartbeat
    /// has gone stale; otherwise its worker is still alive and owns it.
    pub async fn run(&self, job_id: &JobId, redelivered: bool) -> WorkerResult<JobStatus> {
        let logger = JobLogger::new(job_id, "narration");
        let span = logger.create_span();
        self.run_logged(job_id, redelivered, &logger).instrument(span).await
    }

    async fn run_logged(&self, job_id: &JobId, redelivered: bool, logger: &JobLogger) -> WorkerResult<JobStatus> {
        let mut job = self
            .deps
            .jobs
            .get(job_id)
            .await?
            .ok_or_else(|| FirestoreError::not_found(format!("job {}", job_id)))?;

        match job.status {
            JobStatus::Completed | JobStatus::Failed => {
                logger.log_progress(&format!("already {}, nothing to do", job.status));
                return Ok(job.status);
            }
            JobStatus::Processing if redelivered && job.is_stale(self.stale_after) => {
                let err = WorkerError::interrupted("the worker running this job stopped before it finished");
                logger.log_warning(&err.to_string());
                job.fail(err.to_string())?;
                self.deps.jobs.save_transition(&job, JobStatus::Processing).await?;
                record_job(err.kind(), 0.0);
                return Ok(job.status);
            }
            JobStatus::Processing => {
                logger.log_warning("job is still being processed elsewhere");
                return Ok(job.status);
            }
            JobStatus::Pending => {}
        }

        job.begin()?;
        match self.deps.jobs.save_transition(&job, JobStatus::Pending).await {
            Ok(()) => {}
            Err(FirestoreError::InvalidState(msg)) => {
                // Another worker claimed it first.
                logger.log_warning(&msg);
                return Ok(JobStatus::Processing);
            }
            Err(e) => return Err(e.into()),
        }

        logger.log_start(&format!("video {} for owner {}", job.source_video_ref, job.owner_id));
        let started = Instant::now();

        let result = tokio::select! {
            result = self.execute(&job, logger) => result,
            never = self.keep_alive(&job.id) => match never {},
        };
        let elapsed = started.elapsed().as_secs_f64();

        let outcome_label = match result {
            Ok(outcome) => {
                let summary = format!(
                    "{} objects from {} frames ({} failed)",
                    outcome.detected_objects.len(),
                    outcome.frames_sampled,
                    outcome.frames_failed
                );
                match job.complete(outcome) {
                    Ok(()) => {
                        logger.log_completion(&summary);
                        "completed"
                    }
                    Err(e) => {
                        let err = WorkerError::narration(e.to_string());
                        logger.log_error(&err.to_string());
                        job.fail(err.to_string())?;
                        err.kind()
                    }
                }
            }
            Err(err) => {
                logger.log_error(&err.to_string());
                job.fail(err.to_string())?;
                err.kind()
            }
        };

        self.deps.jobs.save_transition(&job, JobStatus::Processing).await?;
        record_job(outcome_label, elapsed);

        info!(job_id = %job.id, status = %job.status, elapsed_secs = elapsed, "Job finished");
        Ok(job.status)
    }

    /// Stamp the job's heartbeat until the caller stops polling.
    async fn keep_alive(&self, job_id: &JobId) -> Infallible {
        let mut ticker = tokio::time::interval(self.heartbeat_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match self.deps.jobs.record_heartbeat(job_id).await {
                Ok(()) => debug!(job_id = %job_id, "Heartbeat"),
                Err(e) => warn!(job_id = %job_id, "Failed to record heartbeat: {}", e),
            }
        }
    }

    async fn execute(&self, job: &VideoJob, logger: &JobLogger) -> WorkerResult<NarrationOutcome> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let work_dir = tempfile::Builder::new()
            .prefix(&format!("job-{}-", job.id))
            .tempdir_in(&self.work_dir)?;

        let video_path = work_dir.path().join(format!("source-{}", job.source_video_ref));
        self.deps
            .store
            .fetch_video(&job.owner_id, &job.source_video_ref, &video_path)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    WorkerError::unsupported_media(format!("source video {} not found", job.source_video_ref))
                } else {
                    e.into()
                }
            })?;

        let frames = self.deps.frames.sample(&video_path, work_dir.path()).await?;
        let frames_sampled = frames.len() as u32;
        logger.log_progress(&format!("sampled {} frames", frames_sampled));

        let results = self.classify_all(frames).await;

        // Barrier: every frame has an answer. Late cancellation discards them.
        self.ensure_still_wanted(job).await?;

        let mut detections = Vec::new();
        let mut frames_failed = 0u32;
        for result in results {
            match result.labels {
                Ok(labels) => detections.extend(labels.into_vec().into_iter().map(|label| Detection {
                    timestamp_secs: result.timestamp_secs,
                    label,
                })),
                Err(e) => {
                    frames_failed += 1;
                    logger.log_warning(&format!("frame at {:.2}s: {}", result.timestamp_secs, e));
                }
            }
        }

        let detected_objects = DetectedObjects::from_detections(&detections);
        let narration_text = compose(&self.deps.lexicon, &detected_objects);
        if narration_text.trim().is_empty() {
            return Err(WorkerError::narration("composed narration is empty"));
        }
        logger.log_progress(&format!("narration composed from {} labels", detected_objects.len()));

        let audio = self.deps.synthesizer.synthesize(&narration_text).await?;

        let format = self.deps.synthesizer.options().format;
        let audio_ref = self
            .deps
            .store
            .store_audio(&job.owner_id, &job.id, audio, format.extension(), format.content_type())
            .await?;

        Ok(NarrationOutcome {
            detected_objects,
            narration_text,
            audio_ref,
            frames_sampled,
            frames_failed,
        })
    }

    /// Classify all frames with bounded fan-out and wait for every call.
    async fn classify_all(&self, frames: Vec<Frame>) -> Vec<FrameResult> {
        let permits = Arc::new(Semaphore::new(self.max_classify_parallel));

        let calls = frames.into_iter().map(|frame| {
            let permits = Arc::clone(&permits);
            let classifier = &self.deps.classifier;
            async move {
                let labels = match permits.acquire_owned().await {
                    Ok(_permit) => classifier.try_classify(&frame).await,
                    Err(e) => Err(WorkerError::classification(e.to_string())),
                };
                FrameResult {
                    timestamp_secs: frame.timestamp_secs,
                    labels,
                }
            }
        });

        join_all(calls).await
    }

    async fn ensure_still_wanted(&self, job: &VideoJob) -> WorkerResult<()> {
        match self.deps.jobs.get(&job.id).await? {
            Some(current) if current.withdraw_requested => return Err(WorkerError::Withdrawn),
            Some(_) => {}
            None => return Err(WorkerError::Withdrawn),
        }

        if self
            .deps
            .store
            .stat_video(&job.owner_id, &job.source_video_ref)
            .await?
            .is_none()
        {
            warn!(job_id = %job.id, "Source video disappeared during processing");
            return Err(WorkerError::unsupported_media(format!(
                "source video {} no longer exists",
                job.source_video_ref
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use navsight_firestore::InMemoryJobRepository;
    use navsight_media::{MediaError, MediaResult};
    use navsight_ml_client::{MlError, MlResult, SpeechOptions, SpeechService, VisionService};
    use navsight_storage::{ObjectInfo, StorageError, StorageResult};
    use tempfile::TempDir;

    use crate::narration::NO_OBJECTS_NARRATION;

    const OWNER: &str = "owner-1";
    const VIDEO: &str = "walk.mp4";

    /// Yields `count` frames whose image bytes carry the frame index.
    struct FakeFrames {
        count: usize,
        fail: bool,
    }

    #[async_trait]
    impl FrameSource for FakeFrames {
        async fn sample(&self, video: &Path, _work_dir: &Path) -> MediaResult<Vec<Frame>> {
            assert!(video.exists(), "video should be fetched before sampling");
            if self.fail {
                return Err(MediaError::unsupported_media("no video stream"));
            }
            Ok((0..self.count)
                .map(|i| Frame {
                    timestamp_secs: i as f64 * 2.0,
                    image: vec![i as u8],
                })
                .collect())
        }
    }

    /// Replies per frame index; `None` is a service error.
    struct ScriptedVision {
        replies: Vec<Option<&'static str>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Duration,
        on_call: Option<Box<dyn Fn() + Send + Sync>>,
    }

    impl ScriptedVision {
        fn new(replies: Vec<Option<&'static str>>) -> Self {
            Self {
                replies,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                delay: Duration::ZERO,
                on_call: None,
            }
        }
    }

    #[async_trait]
    impl VisionService for ScriptedVision {
        async fn describe(&self, image: &[u8], _instruction: &str) -> MlResult<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(hook) = &self.on_call {
                hook();
            }
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.replies.get(image[0] as usize).copied().flatten() {
                Some(text) => Ok(text.to_string()),
                None => Err(MlError::ServiceUnavailable("Vision service returned 503".to_string())),
            }
        }
    }

    struct FakeSpeech {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SpeechService for FakeSpeech {
        async fn synthesize(&self, _text: &str, _options: &SpeechOptions) -> MlResult<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MlError::ServiceUnavailable(
                    "Speech service returned 500 Internal Server Error: boom".to_string(),
                ));
            }
            Ok(b"ID3audio".to_vec())
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        videos: Mutex<HashSet<(String, String)>>,
        audio: Mutex<HashMap<String, Vec<u8>>>,
        drop_video_after_fetch: bool,
        fail_uploads: bool,
    }

    impl MemoryStore {
        fn with_video() -> Self {
            let store = Self::default();
            store.videos.lock().unwrap().insert((OWNER.to_string(), VIDEO.to_string()));
            store
        }
    }

    #[async_trait]
    impl ArtifactStore for MemoryStore {
        async fn stat_video(&self, owner_id: &str, video_ref: &str) -> StorageResult<Option<ObjectInfo>> {
            let present = self
                .videos
                .lock()
                .unwrap()
                .contains(&(owner_id.to_string(), video_ref.to_string()));
            Ok(present.then(|| ObjectInfo {
                key: format!("videos/{}/{}", owner_id, video_ref),
                size: 1024,
                content_type: Some("video/mp4".to_string()),
            }))
        }

        async fn fetch_video(&self, owner_id: &str, video_ref: &str, dest: &Path) -> StorageResult<()> {
            let mut videos = self.videos.lock().unwrap();
            let key = (owner_id.to_string(), video_ref.to_string());
            if !videos.contains(&key) {
                return Err(StorageError::not_found(video_ref));
            }
            if self.drop_video_after_fetch {
                videos.remove(&key);
            }
            std::fs::write(dest, b"video")?;
            Ok(())
        }

        async fn store_audio(
            &self,
            owner_id: &str,
            job_id: &JobId,
            audio: Vec<u8>,
            extension: &str,
            _content_type: &str,
        ) -> StorageResult<String> {
            if self.fail_uploads {
                return Err(StorageError::upload_failed("bucket unavailable"));
            }
            let key = format!("audio-narrations/{}/{}.{}", owner_id, job_id, extension);
            self.audio.lock().unwrap().insert(key.clone(), audio);
            Ok(key)
        }

        async fn presigned_url(&self, locator: &str, _expires_in: Duration) -> StorageResult<String> {
            Ok(format!("https://signed.example/{}", locator))
        }

        async fn check(&self) -> StorageResult<()> {
            Ok(())
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        jobs: Arc<InMemoryJobRepository>,
        store: Arc<MemoryStore>,
        vision: Arc<ScriptedVision>,
        speech: Arc<FakeSpeech>,
        _work: TempDir,
    }

    fn harness(frames: FakeFrames, vision: ScriptedVision, store: MemoryStore, speech_fails: bool) -> Harness {
        harness_with_jobs(frames, vision, store, speech_fails, Arc::new(InMemoryJobRepository::new()))
    }

    fn harness_with_jobs(
        frames: FakeFrames,
        vision: ScriptedVision,
        store: MemoryStore,
        speech_fails: bool,
        jobs: Arc<InMemoryJobRepository>,
    ) -> Harness {
        let work = TempDir::new().unwrap();
        let config = WorkerConfig {
            max_classify_parallel: 2,
            work_dir: work.path().to_path_buf(),
            job_heartbeat_interval: Duration::from_millis(20),
            job_stale_after: Duration::from_millis(200),
            ..WorkerConfig::default()
        };
        let lexicon = Arc::new(NarrationLexicon::builtin());
        let vision = Arc::new(vision);
        let speech = Arc::new(FakeSpeech {
            fail: speech_fails,
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(store);

        let deps = PipelineDeps {
            frames: Arc::new(frames),
            classifier: ObjectClassifier::new(vision.clone(), lexicon.clone(), Duration::from_secs(5)),
            synthesizer: SpeechSynthesizer::new(speech.clone(), SpeechOptions::default(), Duration::from_secs(5)),
            store: store.clone(),
            jobs: jobs.clone(),
            lexicon,
        };

        Harness {
            orchestrator: Orchestrator::new(deps, &config),
            jobs,
            store,
            vision,
            speech,
            _work: work,
        }
    }

    async fn submit(jobs: &InMemoryJobRepository) -> VideoJob {
        let job = VideoJob::new(OWNER, VIDEO);
        jobs.create(&job).await.unwrap();
        job
    }

    fn frames(count: usize) -> FakeFrames {
        FakeFrames { count, fail: false }
    }

    #[tokio::test]
    async fn test_completes_with_deduplicated_narration() {
        let h = harness(
            frames(3),
            ScriptedVision::new(vec![Some(r#"["person", "car"]"#), Some(r#"["Person"]"#), None]),
            MemoryStore::with_video(),
            false,
        );
        let job = submit(&h.jobs).await;

        let status = h.orchestrator.run(&job.id, false).await.unwrap();
        assert_eq!(status, JobStatus::Completed);

        let stored = h.jobs.get(&job.id).await.unwrap().unwrap();
        let lexicon = NarrationLexicon::builtin();
        assert_eq!(stored.detected_objects.as_slice(), ["person", "car"]);
        assert_eq!(
            stored.narration_text.as_deref(),
            Some(format!("{} {}", lexicon.sentence("person").unwrap(), lexicon.sentence("car").unwrap()).as_str())
        );
        let audio_ref = stored.audio_ref.clone().unwrap();
        assert_eq!(audio_ref, format!("audio-narrations/{}/{}.mp3", OWNER, job.id));
        assert!(h.store.audio.lock().unwrap().contains_key(&audio_ref));
        assert_eq!(stored.frames_sampled, 3);
        assert_eq!(stored.frames_failed, 1);
        assert!(stored.error.is_none());
        assert!(stored.started_at.is_some() && stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_malformed_vision_text_recovers_known_labels() {
        let h = harness(
            frames(1),
            ScriptedVision::new(vec![Some("I think there's a dog next to a bicycle here")]),
            MemoryStore::with_video(),
            false,
        );
        let job = submit(&h.jobs).await;

        h.orchestrator.run(&job.id, false).await.unwrap();
        let stored = h.jobs.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.detected_objects.as_slice(), ["dog", "bicycle"]);
    }

    #[tokio::test]
    async fn test_all_frames_failing_still_completes() {
        let h = harness(
            frames(2),
            ScriptedVision::new(vec![None, None]),
            MemoryStore::with_video(),
            false,
        );
        let job = submit(&h.jobs).await;

        assert_eq!(h.orchestrator.run(&job.id, false).await.unwrap(), JobStatus::Completed);
        let stored = h.jobs.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.narration_text.as_deref(), Some(NO_OBJECTS_NARRATION));
        assert_eq!(stored.frames_failed, 2);
    }

    #[tokio::test]
    async fn test_speech_failure_fails_job_without_audio() {
        let h = harness(
            frames(1),
            ScriptedVision::new(vec![Some(r#"["car"]"#)]),
            MemoryStore::with_video(),
            true,
        );
        let job = submit(&h.jobs).await;

        assert_eq!(h.orchestrator.run(&job.id, false).await.unwrap(), JobStatus::Failed);
        let stored = h.jobs.get(&job.id).await.unwrap().unwrap();
        assert!(stored.audio_ref.is_none());
        assert!(stored
            .error
            .as_deref()
            .unwrap()
            .starts_with("Speech synthesis failed: "));
        assert!(h.store.audio.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_video_fails_job() {
        let h = harness(
            FakeFrames { count: 0, fail: true },
            ScriptedVision::new(vec![]),
            MemoryStore::with_video(),
            false,
        );
        let job = submit(&h.jobs).await;

        assert_eq!(h.orchestrator.run(&job.id, false).await.unwrap(), JobStatus::Failed);
        let stored = h.jobs.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.error.as_deref(), Some("Unsupported media: no video stream"));
    }

    #[tokio::test]
    async fn test_missing_video_fails_job() {
        let h = harness(frames(1), ScriptedVision::new(vec![]), MemoryStore::default(), false);
        let job = submit(&h.jobs).await;

        assert_eq!(h.orchestrator.run(&job.id, false).await.unwrap(), JobStatus::Failed);
        let stored = h.jobs.get(&job.id).await.unwrap().unwrap();
        assert!(stored.error.unwrap().starts_with("Unsupported media"));
    }

    #[tokio::test]
    async fn test_storage_failure_fails_job() {
        let store = MemoryStore {
            fail_uploads: true,
            ..MemoryStore::with_video()
        };
        let h = harness(frames(1), ScriptedVision::new(vec![Some(r#"["bus"]"#)]), store, false);
        let job = submit(&h.jobs).await;

        assert_eq!(h.orchestrator.run(&job.id, false).await.unwrap(), JobStatus::Failed);
        let stored = h.jobs.get(&job.id).await.unwrap().unwrap();
        assert!(stored.error.unwrap().starts_with("Storage error"));
        assert!(stored.audio_ref.is_none());
    }

    #[tokio::test]
    async fn test_withdrawal_before_barrier_discards_results() {
        let jobs = Arc::new(InMemoryJobRepository::new());
        let job = submit(&jobs).await;

        let mut vision = ScriptedVision::new(vec![Some(r#"["car"]"#), Some(r#"["dog"]"#)]);
        let hook_jobs = jobs.clone();
        let hook_id = job.id.clone();
        vision.on_call = Some(Box::new(move || {
            let jobs = hook_jobs.clone();
            let id = hook_id.clone();
            tokio::spawn(async move {
                jobs.request_withdraw(&id).await.unwrap();
            });
        }));
        vision.delay = Duration::from_millis(50);

        let h = harness_with_jobs(frames(2), vision, MemoryStore::with_video(), false, jobs);

        assert_eq!(h.orchestrator.run(&job.id, false).await.unwrap(), JobStatus::Failed);
        let stored = h.jobs.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.error.as_deref(), Some("Job withdrawn by owner"));
        assert!(stored.detected_objects.is_empty());
        assert!(stored.narration_text.is_none());
        assert_eq!(h.speech.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_video_removed_before_barrier_fails_job() {
        let store = MemoryStore {
            drop_video_after_fetch: true,
            ..MemoryStore::with_video()
        };
        let h = harness(frames(1), ScriptedVision::new(vec![Some(r#"["car"]"#)]), store, false);
        let job = submit(&h.jobs).await;

        assert_eq!(h.orchestrator.run(&job.id, false).await.unwrap(), JobStatus::Failed);
        let stored = h.jobs.get(&job.id).await.unwrap().unwrap();
        assert!(stored.error.unwrap().contains("no longer exists"));
        assert_eq!(h.speech.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fan_out_is_bounded() {
        let mut vision = ScriptedVision::new(vec![Some("[]"); 6]);
        vision.delay = Duration::from_millis(20);
        let h = harness(frames(6), vision, MemoryStore::with_video(), false);
        let job = submit(&h.jobs).await;

        h.orchestrator.run(&job.id, false).await.unwrap();
        let peak = h.vision.max_in_flight.load(Ordering::SeqCst);
        assert!(peak <= 2, "peak in-flight calls was {}", peak);
        assert!(peak >= 1);
    }

    #[tokio::test]
    async fn test_terminal_job_is_left_alone() {
        let h = harness(frames(1), ScriptedVision::new(vec![]), MemoryStore::with_video(), false);
        let mut job = submit(&h.jobs).await;
        job.begin().unwrap();
        h.jobs.save_transition(&job, JobStatus::Pending).await.unwrap();
        job.fail("earlier failure").unwrap();
        h.jobs.save_transition(&job, JobStatus::Processing).await.unwrap();

        assert_eq!(h.orchestrator.run(&job.id, true).await.unwrap(), JobStatus::Failed);
        let stored = h.jobs.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.error.as_deref(), Some("earlier failure"));
        assert_eq!(h.vision.max_in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_redelivered_processing_job_is_interrupted() {
        let h = harness(frames(1), ScriptedVision::new(vec![]), MemoryStore::with_video(), false);
        let mut job = submit(&h.jobs).await;
        job.begin().unwrap();
        job.last_heartbeat = Some(chrono::Utc::now() - chrono::Duration::minutes(10));
        h.jobs.save_transition(&job, JobStatus::Pending).await.unwrap();

        assert_eq!(h.orchestrator.run(&job.id, true).await.unwrap(), JobStatus::Failed);
        let stored = h.jobs.get(&job.id).await.unwrap().unwrap();
        assert!(stored.error.unwrap().starts_with("Processing interrupted"));
    }

    #[tokio::test]
    async fn test_redelivery_leaves_live_job_to_its_worker() {
        let mut vision = ScriptedVision::new(vec![Some(r#"["car"]"#)]);
        vision.delay = Duration::from_millis(600);
        let h = Arc::new(harness(frames(1), vision, MemoryStore::with_video(), false));
        let job = submit(&h.jobs).await;

        let first = {
            let h = Arc::clone(&h);
            let id = job.id.clone();
            tokio::spawn(async move { h.orchestrator.run(&id, false).await })
        };

        // Past the stale threshold from `begin`, so only heartbeats keep it alive.
        tokio::time::sleep(Duration::from_millis(350)).await;
        let second = h.orchestrator.run(&job.id, true).await.unwrap();
        assert_eq!(second, JobStatus::Processing);

        assert_eq!(first.await.unwrap().unwrap(), JobStatus::Completed);
        let stored = h.jobs.get(&job.id).await.unwrap().unwrap();
        assert!(stored.error.is_none());
        assert_eq!(stored.detected_objects.as_slice(), ["car"]);
        assert_eq!(h.store.audio.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_job_is_an_error() {
        let h = harness(frames(1), ScriptedVision::new(vec![]), MemoryStore::with_video(), false);
        let err = h.orchestrator.run(&JobId::from("missing"), false).await.unwrap_err();
        assert!(matches!(err, WorkerError::Repository(FirestoreError::NotFound(_))));
    }
}
