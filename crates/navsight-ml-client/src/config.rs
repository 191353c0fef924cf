//! Inference service configuration.

use std::time::Duration;

use crate::error::{MlError, MlResult};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration shared by the vision and speech clients.
#[derive(Clone)]
pub struct OpenAiConfig {
    /// Bearer token for the inference API
    pub api_key: String,
    /// API base URL, without trailing slash
    pub base_url: String,
    /// Chat model used for frame classification
    pub vision_model: String,
    pub vision_max_tokens: u32,
    pub vision_temperature: f32,
    /// Per-request timeout for classification calls
    pub vision_timeout: Duration,
    /// Text-to-speech model
    pub speech_model: String,
    /// Per-request timeout for synthesis calls
    pub speech_timeout: Duration,
    /// Retries for transient synthesis failures
    pub speech_max_retries: u32,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("vision_model", &self.vision_model)
            .field("vision_max_tokens", &self.vision_max_tokens)
            .field("vision_temperature", &self.vision_temperature)
            .field("vision_timeout", &self.vision_timeout)
            .field("speech_model", &self.speech_model)
            .field("speech_timeout", &self.speech_timeout)
            .field("speech_max_retries", &self.speech_max_retries)
            .finish()
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            vision_model: "gpt-4o".to_string(),
            vision_max_tokens: 300,
            vision_temperature: 0.3,
            vision_timeout: Duration::from_secs(30),
            speech_model: "tts-1".to_string(),
            speech_timeout: Duration::from_secs(60),
            speech_max_retries: 1,
        }
    }
}

impl OpenAiConfig {
    /// Create config from environment variables. `OPENAI_API_KEY` is required.
    pub fn from_env() -> MlResult<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| MlError::config("OPENAI_API_KEY not set"))?;

        let defaults = Self::default();
        Ok(Self {
            api_key,
            base_url: std::env::var("OPENAI_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            vision_model: std::env::var("VISION_MODEL").unwrap_or(defaults.vision_model),
            vision_max_tokens: std::env::var("VISION_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.vision_max_tokens),
            vision_temperature: std::env::var("VISION_TEMPERATURE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.vision_temperature),
            vision_timeout: Duration::from_secs(
                std::env::var("VISION_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            speech_model: std::env::var("SPEECH_MODEL").unwrap_or(defaults.speech_model),
            speech_timeout: Duration::from_secs(
                std::env::var("SPEECH_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            speech_max_retries: std::env::var("SPEECH_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.speech_max_retries),
        })
    }

    /// Point the clients at a different base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Pause before synthesis retry `attempt` (0-based).
    pub fn speech_retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(500u64.saturating_mul(2u64.saturating_pow(attempt)))
    }

    /// Worst-case time one synthesis call can take, every retry and pause
    /// included.
    pub fn speech_budget(&self) -> Duration {
        let attempts = self.speech_max_retries.saturating_add(1);
        let pauses: Duration = (0..self.speech_max_retries).map(|a| self.speech_retry_delay(a)).sum();
        self.speech_timeout.saturating_mul(attempts) + pauses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_config_defaults() {
        let config = OpenAiConfig::default();
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert_eq!(config.vision_model, "gpt-4o");
        assert_eq!(config.vision_max_tokens, 300);
        assert_eq!(config.speech_model, "tts-1");
        assert_eq!(config.vision_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_speech_budget_covers_retries() {
        let config = OpenAiConfig::default();
        assert_eq!(config.speech_budget(), Duration::from_millis(120_500));

        let config = OpenAiConfig {
            speech_timeout: Duration::from_secs(10),
            speech_max_retries: 2,
            ..OpenAiConfig::default()
        };
        assert_eq!(config.speech_retry_delay(1), Duration::from_secs(1));
        assert_eq!(config.speech_budget(), Duration::from_millis(31_500));
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = OpenAiConfig::default().with_api_key("sk-secret");
        assert!(!format!("{:?}", config).contains("sk-secret"));
    }

    #[test]
    #[serial]
    fn test_from_env_requires_key() {
        std::env::remove_var("OPENAI_API_KEY");
        assert!(matches!(OpenAiConfig::from_env(), Err(MlError::Config(_))));
    }

    #[test]
    #[serial]
    fn test_from_env_reads_overrides() {
        std::env::set_var("OPENAI_API_KEY", "sk-test");
        std::env::set_var("OPENAI_BASE_URL", "http://localhost:9000/v1/");
        std::env::set_var("VISION_TIMEOUT_SECS", "5");

        let config = OpenAiConfig::from_env().unwrap();

        std::env::remove_var("OPENAI_API_KEY");
        std::env::remove_var("OPENAI_BASE_URL");
        std::env::remove_var("VISION_TIMEOUT_SECS");

        assert_eq!(config.base_url, "http://localhost:9000/v1");
        assert_eq!(config.vision_timeout, Duration::from_secs(5));
    }
}
