//! OpenAI-compatible image generation over HTTP.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info_span, Instrument};

use crate::error::GenerationError;

use super::generator::{ImageGenerator, ImagePrompt};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "dall-e-3";
pub const DEFAULT_SIZE: &str = "1024x1024";

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_base: String,
    pub model: String,
    pub size: String,
    pub api_key: Option<String>,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            size: DEFAULT_SIZE.to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerationsResponse {
    #[serde(default)]
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    url: Option<String>,
    b64_json: Option<String>,
}

pub struct OpenAiImageGenerator {
    client: Client,
    settings: OpenAiSettings,
}

impl OpenAiImageGenerator {
    pub fn new(settings: OpenAiSettings) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .user_agent(format!("citybingo/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GenerationError::Upstream(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, settings })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/images/generations",
            self.settings.api_base.trim().trim_end_matches('/')
        )
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImageGenerator {
    async fn generate_image(&self, prompt: &ImagePrompt) -> Result<Option<String>, GenerationError> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GenerationError::Upstream("API key not configured".to_string()))?;

        let payload = json!({
            "model": self.settings.model,
            "prompt": prompt.render(),
            "n": 1,
            "size": self.settings.size,
        });
        let span = info_span!("openai.generate_image", model = %self.settings.model);

        async {
            let response = self
                .client
                .post(self.endpoint())
                .bearer_auth(api_key)
                .json(&payload)
                .send()
                .await
                .map_err(|e| GenerationError::Upstream(format!("Request failed: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let body: String = body.chars().take(512).collect();
                return Err(GenerationError::Upstream(format!("HTTP {}: {}", status, body)));
            }

            let parsed: GenerationsResponse = response
                .json()
                .await
                .map_err(|e| GenerationError::Upstream(format!("Invalid response body: {}", e)))?;

            let Some(first) = parsed.data.into_iter().next() else {
                debug!("Generator returned an empty data array");
                return Ok(None);
            };

            if let Some(url) = first.url.filter(|u| !u.is_empty()) {
                return Ok(Some(url));
            }
            Ok(first
                .b64_json
                .filter(|b| !b.is_empty())
                .map(|b64| format!("data:image/png;base64,{}", b64)))
        }
        .instrument(span)
        .await
    }
}
