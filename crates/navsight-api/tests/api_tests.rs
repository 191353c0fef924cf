//! API tests against in-memory collaborators.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;

use navsight_api::{create_router, ApiConfig, AppState, AuthConfig, JobDispatcher, JwtVerifier};
use navsight_firestore::{InMemoryJobRepository, JobRepository};
use navsight_models::{DetectedObjects, JobId, JobStatus, NarrationOutcome, VideoJob};
use navsight_queue::{NarrationJob, QueueError, QueueResult};
use navsight_storage::{ArtifactStore, ObjectInfo, StorageResult};

const SECRET: &str = "test-secret";

#[derive(Default)]
struct FakeStore {
    videos: Mutex<HashMap<(String, String), u64>>,
}

impl FakeStore {
    fn put(&self, owner: &str, video_ref: &str, size: u64) {
        self.videos
            .lock()
            .unwrap()
            .insert((owner.to_string(), video_ref.to_string()), size);
    }
}

#[async_trait]
impl ArtifactStore for FakeStore {
    async fn stat_video(&self, owner_id: &str, video_ref: &str) -> StorageResult<Option<ObjectInfo>> {
        let size = self
            .videos
            .lock()
            .unwrap()
            .get(&(owner_id.to_string(), video_ref.to_string()))
            .copied();
        Ok(size.map(|size| ObjectInfo {
            key: format!("videos/{}/{}", owner_id, video_ref),
            size,
            content_type: None,
        }))
    }

    async fn fetch_video(&self, _owner_id: &str, _video_ref: &str, _dest: &Path) -> StorageResult<()> {
        Ok(())
    }

    async fn store_audio(
        &self,
        owner_id: &str,
        job_id: &JobId,
        _audio: Vec<u8>,
        extension: &str,
        _content_type: &str,
    ) -> StorageResult<String> {
        Ok(format!("audio-narrations/{}/{}.{}", owner_id, job_id, extension))
    }

    async fn presigned_url(&self, locator: &str, _expires_in: Duration) -> StorageResult<String> {
        Ok(format!("https://signed.example/{}", locator))
    }

    async fn check(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct FakeDispatcher {
    sent: Mutex<Vec<NarrationJob>>,
    down: bool,
}

#[async_trait]
impl JobDispatcher for FakeDispatcher {
    async fn dispatch(&self, job: &NarrationJob) -> QueueResult<String> {
        if self.down {
            return Err(QueueError::connection_failed("connection refused"));
        }
        self.sent.lock().unwrap().push(job.clone());
        Ok(format!("{}-0", self.sent.lock().unwrap().len()))
    }

    async fn check(&self) -> QueueResult<()> {
        if self.down {
            return Err(QueueError::connection_failed("connection refused"));
        }
        Ok(())
    }
}

struct TestApp {
    router: Router,
    store: Arc<FakeStore>,
    jobs: Arc<InMemoryJobRepository>,
    dispatcher: Arc<FakeDispatcher>,
}

fn app_with(dispatcher: FakeDispatcher) -> TestApp {
    let config = ApiConfig {
        max_video_bytes: 1_000,
        auth: AuthConfig {
            hs256_secret: Some(SECRET.to_string()),
            ..AuthConfig::default()
        },
        ..ApiConfig::default()
    };
    let store = Arc::new(FakeStore::default());
    let jobs = Arc::new(InMemoryJobRepository::new());
    let dispatcher = Arc::new(dispatcher);
    let verifier = JwtVerifier::new(config.auth.clone());

    let state = AppState::from_parts(config, store.clone(), jobs.clone(), dispatcher.clone(), verifier);

    TestApp {
        router: create_router(state, None),
        store,
        jobs,
        dispatcher,
    }
}

fn app() -> TestApp {
    app_with(FakeDispatcher::default())
}

fn token(sub: &str) -> String {
    let claims = json!({ "sub": sub, "exp": chrono::Utc::now().timestamp() + 600 });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn send(app: &TestApp, method: &str, uri: &str, owner: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(owner) = owner {
        builder = builder.header("Authorization", format!("Bearer {}", token(owner)));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn submit(app: &TestApp, owner: &str, video_ref: &str) -> (StatusCode, Value) {
    send(app, "POST", "/api/jobs", Some(owner), Some(json!({ "video_ref": video_ref }))).await
}

async fn completed_job(app: &TestApp, owner: &str) -> VideoJob {
    let mut job = VideoJob::new(owner, "walk.mp4");
    app.jobs.create(&job).await.unwrap();
    job.begin().unwrap();
    app.jobs.save_transition(&job, JobStatus::Pending).await.unwrap();
    job.complete(NarrationOutcome {
        detected_objects: DetectedObjects::from(vec!["car".to_string()]),
        narration_text: "Car ahead.".to_string(),
        audio_ref: format!("audio-narrations/{}/{}.mp3", owner, job.id),
        frames_sampled: 3,
        frames_failed: 0,
    })
    .unwrap();
    app.jobs.save_transition(&job, JobStatus::Processing).await.unwrap();
    job
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = app();
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_ready_reports_degraded_dependencies() {
    let (status, body) = send(&app(), "GET", "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");

    let down = app_with(FakeDispatcher {
        down: true,
        ..FakeDispatcher::default()
    });
    let (status, body) = send(&down, "GET", "/ready", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["checks"]["redis"]["status"], "error");
}

#[tokio::test]
async fn test_api_requires_bearer_token() {
    let (status, body) = send(&app(), "POST", "/api/jobs", None, Some(json!({ "video_ref": "a.mp4" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["detail"].as_str().unwrap().contains("bearer"));
}

#[tokio::test]
async fn test_submit_creates_pending_job_and_dispatches() {
    let app = app();
    app.store.put("alice", "walk.mp4", 500);

    let (status, body) = submit(&app, "alice", "walk.mp4").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "pending");

    let job_id = JobId::from(body["job_id"].as_str().unwrap());
    let stored = app.jobs.get(&job_id).await.unwrap().unwrap();
    assert_eq!(stored.owner_id, "alice");
    assert_eq!(stored.source_video_ref, "walk.mp4");
    assert_eq!(stored.status, JobStatus::Pending);

    let sent = app.dispatcher.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].job_id, job_id);
}

#[tokio::test]
async fn test_submit_with_queue_down_fails_the_job() {
    let app = app_with(FakeDispatcher {
        down: true,
        ..FakeDispatcher::default()
    });
    app.store.put("alice", "walk.mp4", 500);

    let (status, body) = submit(&app, "alice", "walk.mp4").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].is_string());

    assert_eq!(app.jobs.len().await, 1);
    let stored = app.jobs.all().await.remove(0);
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored.error.unwrap().starts_with("Could not enqueue job"));
}

#[tokio::test]
async fn test_submit_rejects_video_of_another_owner() {
    let app = app();
    app.store.put("bob", "walk.mp4", 500);

    let (status, _) = submit(&app, "alice", "walk.mp4").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.dispatcher.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_enforces_upload_policy() {
    let app = app();
    app.store.put("alice", "clip.gif", 10);
    app.store.put("alice", "huge.mp4", 5_000);

    assert_eq!(submit(&app, "alice", "../walk.mp4").await.0, StatusCode::BAD_REQUEST);
    assert_eq!(submit(&app, "alice", "clip.gif").await.0, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(submit(&app, "alice", "huge.mp4").await.0, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(app.jobs.is_empty().await);
}

#[tokio::test]
async fn test_get_job_is_owner_only() {
    let app = app();
    app.store.put("alice", "walk.mp4", 500);
    let (_, body) = submit(&app, "alice", "walk.mp4").await;
    let uri = format!("/api/jobs/{}", body["job_id"].as_str().unwrap());

    let (status, view) = send(&app, "GET", &uri, Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "pending");
    assert_eq!(view["detected_objects"], json!([]));
    assert!(view.get("audio_url").is_none());

    let (status, _) = send(&app, "GET", &uri, Some("mallory"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_completed_job_view_links_audio() {
    let app = app();
    let job = completed_job(&app, "alice").await;

    let (status, view) = send(&app, "GET", &format!("/api/jobs/{}", job.id), Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "completed");
    assert_eq!(view["detected_objects"], json!(["car"]));
    assert_eq!(view["narration_text"], "Car ahead.");
    assert_eq!(
        view["audio_url"],
        format!("https://signed.example/audio-narrations/alice/{}.mp3", job.id)
    );
}

#[tokio::test]
async fn test_withdraw_pending_job() {
    let app = app();
    app.store.put("alice", "walk.mp4", 500);
    let (_, body) = submit(&app, "alice", "walk.mp4").await;
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let uri = format!("/api/jobs/{}/withdraw", job_id);
    assert_eq!(send(&app, "POST", &uri, Some("mallory"), None).await.0, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "POST", &uri, Some("alice"), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["withdraw_requested"], true);

    let stored = app.jobs.get(&JobId::from(job_id)).await.unwrap().unwrap();
    assert!(stored.withdraw_requested);
    assert_eq!(stored.status, JobStatus::Pending);
}

#[tokio::test]
async fn test_withdraw_finished_job_conflicts() {
    let app = app();
    let job = completed_job(&app, "alice").await;

    let (status, _) = send(&app, "POST", &format!("/api/jobs/{}/withdraw", job.id), Some("alice"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let (status, body) = send(&app(), "GET", "/api/jobs/nope", Some("alice"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].is_string());
}
