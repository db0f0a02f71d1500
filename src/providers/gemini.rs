//! Google Gemini Vision provider.
//!
//! Uses Gemini's generateContent API with inline image data.
//! Requires GEMINI_API_KEY (or GOOGLE_AI_API_KEY).
//!
//! Rate limiting:
//! - Set GEMINI_DELAY_MS to configure delay between requests (default: 200ms)
//! - Automatically retries on 429 with exponential backoff

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::api_backend;
use super::backend::{OcrProvider, ProviderError, ProviderKind, ProviderMetadata};

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com";

/// Gemini Vision provider using Google's Generative AI API.
pub struct GeminiProvider {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    InlineData { inline_data: GeminiInlineData },
}

#[derive(Debug, Serialize)]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiResponseContent,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

impl GeminiProvider {
    /// Create a new Gemini provider, reading the API key from the environment.
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: GEMINI_ENDPOINT.to_string(),
            api_key: std::env::var("GEMINI_API_KEY")
                .or_else(|_| std::env::var("GOOGLE_AI_API_KEY"))
                .ok(),
            model: ProviderKind::Gemini.default_model().to_string(),
            max_output_tokens: 8192,
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the model (e.g., "gemini-1.5-flash", "gemini-1.5-pro").
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the API base URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the maximum number of output tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_output_tokens = max_tokens;
        self
    }

    fn build_request(&self, image: &[u8], prompt: String) -> GeminiRequest {
        let (data, mime_type) = api_backend::encode_image_base64(image);
        GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![
                    GeminiPart::Text { text: prompt },
                    GeminiPart::InlineData {
                        inline_data: GeminiInlineData {
                            mime_type: mime_type.to_string(),
                            data,
                        },
                    },
                ],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: 0.1,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }

    async fn generate(&self, image: &[u8], prompt: String) -> Result<String, ProviderError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            ProviderError::NotAvailable(
                "GEMINI_API_KEY not set. Get an API key from https://ai.google.dev/".to_string(),
            )
        })?;

        let request = self.build_request(image, prompt);
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.endpoint, self.model, api_key
        );
        let name = self.name();

        api_backend::apply_rate_delay("GEMINI_DELAY_MS", 200, &name).await;

        let response = api_backend::retry_on_rate_limit(&name, || async {
            self.client
                .post(&url)
                .json(&request)
                .send()
                .await
                .map_err(ProviderError::from)
        })
        .await?;
        let response = api_backend::error_for_status(&name, response).await?;

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ExtractionFailed(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = gemini_response.error {
            return Err(ProviderError::ExtractionFailed(format!(
                "Gemini API error: {}",
                error.message
            )));
        }

        gemini_response
            .candidates
            .and_then(|c| c.into_iter().next())
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| ProviderError::ExtractionFailed("Gemini returned empty response".to_string()))
    }
}

impl Default for GeminiProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrProvider for GeminiProvider {
    fn name(&self) -> String {
        format!("Gemini ({})", self.model)
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            provider: "Google".to_string(),
            model: self.model.clone(),
            capabilities: vec!["vision".into(), "text".into(), "markdown".into()],
            max_tokens: self.max_output_tokens,
            supports_context: true,
        }
    }

    async fn extract(&self, image: &[u8]) -> Result<String, ProviderError> {
        let prompt = format!(
            "{}\n\n{}",
            api_backend::SYSTEM_MARKDOWN_PROMPT,
            api_backend::USER_MARKDOWN_PROMPT
        );
        self.generate(image, prompt).await
    }

    async fn extract_with_context(
        &self,
        image: &[u8],
        instructions: &str,
    ) -> Result<String, ProviderError> {
        let prompt = format!("{}\n\n{}", api_backend::SYSTEM_MARKDOWN_PROMPT, instructions);
        self.generate(image, prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let provider = GeminiProvider::new().with_api_key("test");
        let request = provider.build_request(b"raw", "prompt".to_string());
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["contents"][0]["parts"][0]["text"], "prompt");
        assert_eq!(
            json["contents"][0]["parts"][1]["inline_data"]["mime_type"],
            "image/png"
        );
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 8192);
    }

    #[test]
    fn test_metadata() {
        let provider = GeminiProvider::new().with_model("gemini-1.5-pro");
        assert_eq!(provider.name(), "Gemini (gemini-1.5-pro)");
        let meta = provider.metadata();
        assert_eq!(meta.provider, "Google");
        assert_eq!(meta.model, "gemini-1.5-pro");
    }

    #[test]
    fn test_response_parsing_joins_parts() {
        let body = r##"{"candidates":[{"content":{"parts":[{"text":"# A"},{"text":"\nB"}]}}]}"##;
        let parsed: GeminiResponse = serde_json::from_str(body).unwrap();
        let parts = &parsed.candidates.unwrap()[0].content.parts;
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].text.as_deref(), Some("# A"));
    }
}
