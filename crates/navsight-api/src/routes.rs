//! Router assembly.

use std::sync::Arc;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{get_job, health, ready, submit_job, withdraw_job};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, rate_limit_middleware, request_id, request_logging, security_headers, ClientRateLimiter};
use crate::state::AppState;

/// Authenticated job endpoints, rate limited per client IP.
fn job_routes(requests_per_second: u32) -> Router<AppState> {
    let limiter = Arc::new(ClientRateLimiter::new(requests_per_second));
    Router::new()
        .route("/jobs", post(submit_job))
        .route("/jobs/:job_id", get(get_job))
        .route("/jobs/:job_id/withdraw", post(withdraw_job))
        .route_layer(from_fn_with_state(limiter, rate_limit_middleware))
}

/// Probes, plus `/metrics` when a recorder is installed.
fn ops_routes(metrics: Option<PrometheusHandle>) -> Router<AppState> {
    let router = Router::new().route("/health", get(health)).route("/ready", get(ready));
    match metrics {
        Some(handle) => router.route("/metrics", get(move || std::future::ready(handle.render()))),
        None => router,
    }
}

pub fn create_router(state: AppState, metrics: Option<PrometheusHandle>) -> Router {
    let config = &state.config;

    // Layers run outermost-last: CORS sees the request first.
    Router::new()
        .nest("/api", job_routes(config.rate_limit_rps))
        .merge(ops_routes(metrics))
        .layer(RequestBodyLimitLayer::new(config.max_body_size))
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(security_headers))
        .layer(from_fn(request_id))
        .layer(from_fn(request_logging))
        .layer(cors_layer(&config.cors_origins))
        .with_state(state)
}
