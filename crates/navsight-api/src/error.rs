//! Errors returned by the HTTP handlers.
//!
//! Every error renders as `{"detail": "..."}`. Failures of a backing
//! service are logged and reported as 500; outside development their
//! message is replaced by a generic one.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use navsight_firestore::FirestoreError;
use navsight_models::UploadViolation;
use navsight_queue::QueueError;
use navsight_storage::StorageError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not authenticated: {0}")]
    Unauthorized(String),

    /// Also used for resources owned by another caller.
    #[error("No such {0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    UnsupportedMediaType(String),

    #[error("Video storage unavailable: {0}")]
    Storage(#[from] StorageError),

    #[error("Job store unavailable: {0}")]
    Firestore(#[from] FirestoreError),

    #[error("Job could not be queued: {0}")]
    Queue(#[from] QueueError),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    fn is_backend_failure(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Firestore(_) | Self::Queue(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Storage(_) | Self::Firestore(_) | Self::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<UploadViolation> for ApiError {
    fn from(violation: UploadViolation) -> Self {
        let detail = violation.to_string();
        match violation {
            UploadViolation::InvalidRef(_) => Self::BadRequest(detail),
            UploadViolation::UnsupportedFormat(_) => Self::UnsupportedMediaType(detail),
            UploadViolation::TooLarge { .. } => Self::PayloadTooLarge(detail),
        }
    }
}

fn hide_backend_details() -> bool {
    std::env::var("ENVIRONMENT").is_ok_and(|env| env == "production")
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = if self.is_backend_failure() {
            tracing::error!(error = %self, "Backend failure while handling request");
            if hide_backend_details() {
                "Something went wrong on our side".to_string()
            } else {
                self.to_string()
            }
        } else {
            self.to_string()
        };

        (self.status_code(), Json(json!({ "detail": detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_violations_map_to_statuses() {
        let cases = [
            (UploadViolation::InvalidRef("../x".into()), StatusCode::BAD_REQUEST),
            (UploadViolation::UnsupportedFormat("a.gif".into()), StatusCode::UNSUPPORTED_MEDIA_TYPE),
            (UploadViolation::TooLarge { size: 10, max: 5 }, StatusCode::PAYLOAD_TOO_LARGE),
        ];
        for (violation, status) in cases {
            assert_eq!(ApiError::from(violation).status_code(), status);
        }
    }

    #[test]
    fn test_backend_failures_are_server_errors() {
        let err = ApiError::from(QueueError::connection_failed("refused"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_backend_failure());
        assert!(!ApiError::not_found("job").is_backend_failure());
    }
}
