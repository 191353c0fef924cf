//! Clients for the external inference services.
//!
//! Two capabilities are consumed over HTTP (OpenAI-compatible endpoints):
//! - Vision: one image plus an instruction in, free-form text out
//! - Speech: narration text in, encoded audio bytes out
//!
//! Both sit behind traits so the pipeline can be driven by other backends
//! or by test doubles.

pub mod config;
pub mod error;
pub mod speech;
pub mod types;
pub mod vision;

pub use config::OpenAiConfig;
pub use error::{MlError, MlResult};
pub use speech::{AudioFormat, OpenAiSpeechClient, SpeechOptions, SpeechService};
pub use vision::{OpenAiVisionClient, VisionService};
