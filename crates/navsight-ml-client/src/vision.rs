//! Vision service client.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use tracing::{debug, info_span, Instrument};

use crate::config::OpenAiConfig;
use crate::error::{MlError, MlResult};
use crate::types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ContentPart, ImageUrl};

const USER_PROMPT: &str = "What objects do you see in this image that are relevant for navigation?";

/// A vision-capable inference service.
///
/// The response is free-form text and carries no schema guarantee; callers
/// are expected to parse it defensively.
#[async_trait]
pub trait VisionService: Send + Sync {
    /// Ask the service about one JPEG image under a fixed instruction.
    async fn describe(&self, image_jpeg: &[u8], instruction: &str) -> MlResult<String>;
}

/// Vision client for OpenAI-compatible chat completion endpoints.
pub struct OpenAiVisionClient {
    http: Client,
    config: OpenAiConfig,
}

impl OpenAiVisionClient {
    /// Create a new vision client.
    pub fn new(config: OpenAiConfig) -> MlResult<Self> {
        let http = Client::builder()
            .timeout(config.vision_timeout)
            .build()
            .map_err(MlError::Network)?;

        Ok(Self { http, config })
    }

    fn build_request(&self, image_jpeg: &[u8], instruction: &str) -> ChatCompletionRequest {
        let data_url = format!("data:image/jpeg;base64,{}", BASE64.encode(image_jpeg));

        ChatCompletionRequest {
            model: self.config.vision_model.clone(),
            messages: vec![
                ChatMessage::system(instruction),
                ChatMessage::user_parts(vec![
                    ContentPart::Text {
                        text: USER_PROMPT.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ]),
            ],
            max_tokens: self.config.vision_max_tokens,
            temperature: self.config.vision_temperature,
        }
    }
}

#[async_trait]
impl VisionService for OpenAiVisionClient {
    async fn describe(&self, image_jpeg: &[u8], instruction: &str) -> MlResult<String> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let request = self.build_request(image_jpeg, instruction);
        let timeout_secs = self.config.vision_timeout.as_secs();

        let span = info_span!("vision_describe", model = %self.config.vision_model, image_bytes = image_jpeg.len());

        async {
            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| MlError::from_transport(e, timeout_secs))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(MlError::from_status("Vision service", status, &body));
            }

            let completion: ChatCompletionResponse = response
                .json()
                .await
                .map_err(|e| MlError::invalid_response(format!("Unreadable completion: {}", e)))?;

            let text = completion
                .first_text()
                .ok_or_else(|| MlError::invalid_response("No content in vision response"))?
                .to_string();

            debug!(chars = text.len(), "Vision service responded");
            Ok(text)
        }
        .instrument(span)
        .await
    }
}
