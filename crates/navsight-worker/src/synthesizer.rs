//! Speech synthesis with a bounded timeout.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use navsight_ml_client::{SpeechOptions, SpeechService};

use crate::error::{WorkerError, WorkerResult};

/// Turns narration text into encoded audio. Every failure is a
/// `WorkerError::Synthesis` and fatal to the job.
#[derive(Clone)]
pub struct SpeechSynthesizer {
    speech: Arc<dyn SpeechService>,
    options: SpeechOptions,
    timeout: Duration,
}

impl SpeechSynthesizer {
    pub fn new(speech: Arc<dyn SpeechService>, options: SpeechOptions, timeout: Duration) -> Self {
        Self {
            speech,
            options,
            timeout,
        }
    }

    pub fn options(&self) -> &SpeechOptions {
        &self.options
    }

    pub async fn synthesize(&self, text: &str) -> WorkerResult<Vec<u8>> {
        if text.trim().is_empty() {
            return Err(WorkerError::synthesis("narration text is empty"));
        }

        let audio = tokio::time::timeout(self.timeout, self.speech.synthesize(text, &self.options))
            .await
            .map_err(|_| {
                WorkerError::synthesis(format!(
                    "Speech service timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| WorkerError::synthesis(e.to_string()))?;

        if audio.is_empty() {
            return Err(WorkerError::synthesis("Speech service returned no audio"));
        }

        debug!(bytes = audio.len(), format = self.options.format.as_str(), "Synthesized narration");
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use navsight_ml_client::{MlError, MlResult};

    struct FailingSpeech;

    #[async_trait]
    impl SpeechService for FailingSpeech {
        async fn synthesize(&self, _text: &str, _options: &SpeechOptions) -> MlResult<Vec<u8>> {
            Err(MlError::ServiceUnavailable(
                "Speech service returned 500 Internal Server Error: boom".to_string(),
            ))
        }
    }

    struct HangingSpeech;

    #[async_trait]
    impl SpeechService for HangingSpeech {
        async fn synthesize(&self, _text: &str, _options: &SpeechOptions) -> MlResult<Vec<u8>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![1])
        }
    }

    #[tokio::test]
    async fn test_service_error_is_synthesis_error() {
        let synth = SpeechSynthesizer::new(Arc::new(FailingSpeech), SpeechOptions::default(), Duration::from_secs(1));
        let err = synth.synthesize("hello").await.unwrap_err();
        assert!(matches!(err, WorkerError::Synthesis(_)));
        assert!(err.to_string().starts_with("Speech synthesis failed: Service unavailable"));
    }

    #[tokio::test]
    async fn test_timeout_is_synthesis_error() {
        let synth = SpeechSynthesizer::new(Arc::new(HangingSpeech), SpeechOptions::default(), Duration::from_millis(20));
        let err = synth.synthesize("hello").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
