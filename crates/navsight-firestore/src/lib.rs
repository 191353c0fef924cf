//! Firestore REST API client.
//!
//! This crate provides:
//! - A Firestore REST client with service account auth via gcp_auth
//! - Precondition-guarded updates and retry with backoff
//! - The `JobRepository` for `VideoJob` records, backed by Firestore or memory

pub mod client;
pub mod error;
pub mod job_repo;
pub mod memory;
pub mod metrics;
pub mod retry;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use job_repo::{FirestoreJobRepository, JobRepository, WithdrawOutcome, JOBS_COLLECTION};
pub use memory::InMemoryJobRepository;
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
