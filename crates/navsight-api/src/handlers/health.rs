//! Liveness and readiness probes.

use std::fmt::Display;
use std::future::Future;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use navsight_models::JobId;

use crate::state::AppState;

/// GET /health. Answers as long as the process is serving.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Serialize)]
pub struct DependencyCheck {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DependencyCheck {
    async fn run<T, E: Display>(probe: impl Future<Output = Result<T, E>>) -> Self {
        let started = Instant::now();
        match probe.await {
            Ok(_) => Self {
                status: "ok",
                latency_ms: Some(started.elapsed().as_millis() as u64),
                error: None,
            },
            Err(e) => Self {
                status: "error",
                latency_ms: None,
                error: Some(e.to_string()),
            },
        }
    }

    fn passed(&self) -> bool {
        self.status == "ok"
    }
}

#[derive(Debug, Serialize)]
pub struct Readiness {
    pub status: &'static str,
    pub checks: Checks,
}

#[derive(Debug, Serialize)]
pub struct Checks {
    pub redis: DependencyCheck,
    pub firestore: DependencyCheck,
    pub storage: DependencyCheck,
}

/// GET /ready. 503 unless the job stream, the job store and the bucket all
/// answer.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    // Any id works; a miss still proves Firestore answered.
    let probe = JobId::from("_readiness_probe");
    let (redis, firestore, storage) = tokio::join!(
        DependencyCheck::run(state.dispatcher.check()),
        DependencyCheck::run(state.jobs.get(&probe)),
        DependencyCheck::run(state.store.check()),
    );

    let ok = [&redis, &firestore, &storage].iter().all(|c| c.passed());
    let body = Readiness {
        status: if ok { "ready" } else { "degraded" },
        checks: Checks {
            redis,
            firestore,
            storage,
        },
    };
    let code = if ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(body))
}
