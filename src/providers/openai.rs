//! OpenAI-compatible vision provider (OpenAI GPT-4o, Groq).
//!
//! Sends the page image as a base64 data URL through the chat-completions
//! API. Requires OPENAI_API_KEY (or GROQ_API_KEY for Groq).
//!
//! Rate limiting:
//! - Set OPENAI_DELAY_MS / GROQ_DELAY_MS to pace requests (default: 0ms / 200ms)
//! - Retries on 429 with exponential backoff

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::api_backend;
use super::backend::{OcrProvider, ProviderError, ProviderKind, ProviderMetadata};

const OPENAI_ENDPOINT: &str = "https://api.openai.com";
const GROQ_ENDPOINT: &str = "https://api.groq.com/openai";

/// Vision provider speaking the OpenAI chat-completions protocol.
pub struct OpenAiVisionProvider {
    kind: ProviderKind,
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ChatContent>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ChatContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl OpenAiVisionProvider {
    /// Create an OpenAI GPT-4o provider using OPENAI_API_KEY.
    pub fn openai() -> Self {
        Self::new(
            ProviderKind::OpenAi,
            OPENAI_ENDPOINT,
            std::env::var("OPENAI_API_KEY").ok(),
        )
    }

    /// Create a Groq vision provider using GROQ_API_KEY.
    pub fn groq() -> Self {
        Self::new(
            ProviderKind::Groq,
            GROQ_ENDPOINT,
            std::env::var("GROQ_API_KEY").ok(),
        )
    }

    fn new(kind: ProviderKind, endpoint: &str, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        Self {
            kind,
            client,
            endpoint: endpoint.to_string(),
            api_key,
            model: kind.default_model().to_string(),
            max_tokens: 4096,
            temperature: 0.0,
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the model (e.g., "gpt-4o-2024-08-06").
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the API base URL (without the `/v1/...` path).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the maximum number of output tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn delay_env(&self) -> (&'static str, u64) {
        match self.kind {
            ProviderKind::Groq => ("GROQ_DELAY_MS", 200),
            _ => ("OPENAI_DELAY_MS", 0),
        }
    }

    async fn complete(&self, image: &[u8], user_text: &str) -> Result<String, ProviderError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            ProviderError::NotAvailable(format!(
                "{} API key not set",
                self.kind.as_str().to_uppercase()
            ))
        })?;

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: vec![ChatContent::Text {
                        text: api_backend::SYSTEM_MARKDOWN_PROMPT.to_string(),
                    }],
                },
                ChatMessage {
                    role: "user",
                    content: vec![
                        ChatContent::Text {
                            text: user_text.to_string(),
                        },
                        ChatContent::ImageUrl {
                            image_url: ImageUrl {
                                url: api_backend::image_data_url(image),
                            },
                        },
                    ],
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let url = format!("{}/v1/chat/completions", self.endpoint);
        let name = self.name();

        let (delay_var, delay_default) = self.delay_env();
        api_backend::apply_rate_delay(delay_var, delay_default, &name).await;

        let response = api_backend::retry_on_rate_limit(&name, || async {
            self.client
                .post(&url)
                .bearer_auth(api_key)
                .json(&request)
                .send()
                .await
                .map_err(ProviderError::from)
        })
        .await?;
        let response = api_backend::error_for_status(&name, response).await?;

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ExtractionFailed(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = chat.error {
            return Err(ProviderError::ExtractionFailed(format!(
                "{} API error: {}",
                name, error.message
            )));
        }

        chat.choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| ProviderError::ExtractionFailed(format!("{} returned no content", name)))
    }
}

#[async_trait]
impl OcrProvider for OpenAiVisionProvider {
    fn name(&self) -> String {
        match self.kind {
            ProviderKind::Groq => format!("Groq ({})", self.model),
            _ => format!("GPT-4o ({})", self.model),
        }
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            provider: match self.kind {
                ProviderKind::Groq => "Groq".to_string(),
                _ => "OpenAI".to_string(),
            },
            model: self.model.clone(),
            capabilities: vec!["vision".into(), "text".into(), "markdown".into()],
            max_tokens: self.max_tokens,
            supports_context: true,
        }
    }

    async fn extract(&self, image: &[u8]) -> Result<String, ProviderError> {
        self.complete(image, api_backend::USER_MARKDOWN_PROMPT).await
    }

    async fn extract_with_context(
        &self,
        image: &[u8],
        instructions: &str,
    ) -> Result<String, ProviderError> {
        self.complete(image, instructions).await
    }
}
