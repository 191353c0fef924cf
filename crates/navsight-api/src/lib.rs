//! Axum HTTP API server.
//!
//! This crate provides:
//! - Job submission, polling and withdrawal for narration jobs
//! - JWKS-backed bearer token verification
//! - Rate limiting and security headers
//! - Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use auth::{AuthUser, JwtVerifier};
pub use config::{ApiConfig, AuthConfig};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::{AppState, JobDispatcher};
