//! Speech service client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn, Instrument};

use crate::config::OpenAiConfig;
use crate::error::{MlError, MlResult};
use crate::types::SpeechRequest;

/// Encoded audio formats the speech service can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Opus,
    Aac,
    Flac,
    Wav,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Opus => "opus",
            AudioFormat::Aac => "aac",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Opus => "audio/ogg",
            AudioFormat::Aac => "audio/aac",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Wav => "audio/wav",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "mp3" => Some(AudioFormat::Mp3),
            "opus" => Some(AudioFormat::Opus),
            "aac" => Some(AudioFormat::Aac),
            "flac" => Some(AudioFormat::Flac),
            "wav" => Some(AudioFormat::Wav),
            _ => None,
        }
    }
}

/// Fixed voice and output format for synthesized narration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechOptions {
    pub voice: String,
    pub format: AudioFormat,
}

impl Default for SpeechOptions {
    fn default() -> Self {
        Self {
            voice: "alloy".to_string(),
            format: AudioFormat::Mp3,
        }
    }
}

impl SpeechOptions {
    /// Create options from environment variables.
    pub fn from_env() -> Self {
        Self {
            voice: std::env::var("SPEECH_VOICE").unwrap_or_else(|_| "alloy".to_string()),
            format: std::env::var("SPEECH_FORMAT")
                .ok()
                .and_then(|s| AudioFormat::parse(&s))
                .unwrap_or_default(),
        }
    }
}

/// A text-to-speech inference service.
#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Synthesize `text`, returning the encoded audio payload.
    async fn synthesize(&self, text: &str, options: &SpeechOptions) -> MlResult<Vec<u8>>;
}

/// Speech client for OpenAI-compatible `/audio/speech` endpoints.
pub struct OpenAiSpeechClient {
    http: Client,
    config: OpenAiConfig,
}

impl OpenAiSpeechClient {
    /// Create a new speech client.
    pub fn new(config: OpenAiConfig) -> MlResult<Self> {
        let http = Client::builder()
            .timeout(config.speech_timeout)
            .build()
            .map_err(MlError::Network)?;

        Ok(Self { http, config })
    }

    async fn request_once(&self, request: &SpeechRequest) -> MlResult<Vec<u8>> {
        let url = format!("{}/audio/speech", self.config.base_url);
        let timeout_secs = self.config.speech_timeout.as_secs();

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| MlError::from_transport(e, timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MlError::from_status("Speech service", status, &body));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();

        // Error envelopes sometimes arrive with a 200.
        if content_type.starts_with("application/json") || content_type.starts_with("text/") {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(200).collect();
            return Err(MlError::invalid_response(format!(
                "Expected audio payload, got {}: {}",
                content_type, body
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MlError::from_transport(e, timeout_secs))?;

        if bytes.is_empty() {
            return Err(MlError::invalid_response("Empty audio payload"));
        }

        Ok(bytes.to_vec())
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> MlResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = MlResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.speech_max_retries => {
                    let delay = self.config.speech_retry_delay(attempt);
                    warn!(
                        "Speech request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl SpeechService for OpenAiSpeechClient {
    async fn synthesize(&self, text: &str, options: &SpeechOptions) -> MlResult<Vec<u8>> {
        let request = SpeechRequest {
            model: self.config.speech_model.clone(),
            input: text.to_string(),
            voice: options.voice.clone(),
            response_format: options.format.as_str().to_string(),
        };

        let span = info_span!(
            "speech_synthesize",
            model = %self.config.speech_model,
            voice = %options.voice,
            chars = text.len()
        );

        async {
            let audio = self.with_retry(|| self.request_once(&request)).await?;
            debug!(bytes = audio.len(), "Speech service responded");
            Ok(audio)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, retries: u32) -> OpenAiSpeechClient {
        let mut config = OpenAiConfig::default()
            .with_api_key("sk-test")
            .with_base_url(server.uri());
        config.speech_max_retries = retries;
        OpenAiSpeechClient::new(config).unwrap()
    }

    #[test]
    fn test_audio_format_parsing() {
        assert_eq!(AudioFormat::parse("MP3"), Some(AudioFormat::Mp3));
        assert_eq!(AudioFormat::parse("ogg"), None);
        assert_eq!(AudioFormat::Mp3.content_type(), "audio/mpeg");
        assert_eq!(AudioFormat::Wav.extension(), "wav");
    }

    #[tokio::test]
    async fn test_synthesize_returns_audio_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/speech"))
            .and(body_json(json!({
                "model": "tts-1",
                "input": "There is a person ahead.",
                "voice": "alloy",
                "response_format": "mp3"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/mpeg")
                    .set_body_bytes(vec![0x49, 0x44, 0x33, 0x04]),
            )
            .expect(1)
            .mount(&server)
            .await;

        let audio = client_for(&server, 0)
            .synthesize("There is a person ahead.", &SpeechOptions::default())
            .await
            .unwrap();
        assert_eq!(audio, vec![0x49, 0x44, 0x33, 0x04]);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("input too long"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server, 2)
            .synthesize("hello", &SpeechOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MlError::RequestFailed(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_retried_then_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(2)
            .mount(&server)
            .await;

        let err = client_for(&server, 1)
            .synthesize("hello", &SpeechOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MlError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_json_body_is_malformed_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "nope"})))
            .mount(&server)
            .await;

        let err = client_for(&server, 0)
            .synthesize("hello", &SpeechOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MlError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_empty_body_is_malformed_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "audio/mpeg"))
            .mount(&server)
            .await;

        let err = client_for(&server, 0)
            .synthesize("hello", &SpeechOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MlError::InvalidResponse(_)));
    }
}
