//! Narration pipeline worker.
//!
//! This crate provides:
//! - Object classification over the Vision Service
//! - Narration composition from the lexicon
//! - Speech synthesis with a bounded timeout
//! - The pipeline orchestrator driving the job state machine
//! - A queue executor with crash recovery and graceful shutdown

pub mod classifier;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod narration;
pub mod orchestrator;
pub mod synthesizer;

pub use classifier::{parse_labels, ObjectClassifier, NAVIGATION_INSTRUCTION};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use narration::{compose, CAUTION_PHRASE, NO_OBJECTS_NARRATION};
pub use orchestrator::{Orchestrator, PipelineDeps};
pub use synthesizer::SpeechSynthesizer;
