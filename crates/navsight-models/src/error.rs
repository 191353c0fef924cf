//! Model error types.

use thiserror::Error;

use crate::job::JobStatus;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid job transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Incomplete job result: {0}")]
    IncompleteResult(String),

    #[error("Invalid lexicon: {0}")]
    InvalidLexicon(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModelError {
    pub fn invalid_transition(from: JobStatus, to: JobStatus) -> Self {
        Self::InvalidTransition { from, to }
    }

    pub fn incomplete_result(msg: impl Into<String>) -> Self {
        Self::IncompleteResult(msg.into())
    }

    pub fn invalid_lexicon(msg: impl Into<String>) -> Self {
        Self::InvalidLexicon(msg.into())
    }
}
