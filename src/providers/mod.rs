//! OCR model providers.
//!
//! Every provider turns one page image into markdown:
//! - **OpenAI**: GPT-4o vision via chat completions (OPENAI_API_KEY)
//! - **Groq**: Llama 4 vision via the OpenAI-compatible API (GROQ_API_KEY)
//! - **Gemini**: Google's vision LLM (GEMINI_API_KEY)
//!
//! Use [`create_provider`] to build one from configuration.

mod api_backend;
mod backend;
mod gemini;
mod openai;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use backend::{
    extract_with_timeout, guarded_extract, validate_output, OcrProvider, ProviderError,
    ProviderKind, ProviderMetadata,
};
pub use gemini::GeminiProvider;
pub use openai::OpenAiVisionProvider;

/// Configuration for a single provider slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderSpec {
    /// Backend kind (openai, groq, gemini).
    #[serde(default)]
    pub kind: ProviderKind,
    /// Model override; the kind's default model is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// API base URL override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Maximum output tokens override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// API key (never serialized; normally taken from the environment).
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

impl ProviderSpec {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    /// Parse "kind" or "kind:model" (e.g., "gemini:gemini-1.5-pro").
    pub fn parse(value: &str) -> Option<Self> {
        let (kind, model) = match value.split_once(':') {
            Some((kind, model)) => (kind, Some(model.trim().to_string())),
            None => (value, None),
        };
        let kind = ProviderKind::from_str(kind.trim())?;
        Some(Self {
            kind,
            model: model.filter(|m| !m.is_empty()),
            ..Default::default()
        })
    }
}

/// Create a provider from its configuration.
pub fn create_provider(spec: &ProviderSpec) -> Arc<dyn OcrProvider> {
    match spec.kind {
        ProviderKind::OpenAi | ProviderKind::Groq => {
            let mut provider = if spec.kind == ProviderKind::Groq {
                OpenAiVisionProvider::groq()
            } else {
                OpenAiVisionProvider::openai()
            };
            if let Some(ref model) = spec.model {
                provider = provider.with_model(model);
            }
            if let Some(ref endpoint) = spec.endpoint {
                provider = provider.with_endpoint(endpoint);
            }
            if let Some(max_tokens) = spec.max_tokens {
                provider = provider.with_max_tokens(max_tokens);
            }
            if let Some(ref key) = spec.api_key {
                provider = provider.with_api_key(key);
            }
            Arc::new(provider)
        }
        ProviderKind::Gemini => {
            let mut provider = GeminiProvider::new();
            if let Some(ref model) = spec.model {
                provider = provider.with_model(model);
            }
            if let Some(ref endpoint) = spec.endpoint {
                provider = provider.with_endpoint(endpoint);
            }
            if let Some(max_tokens) = spec.max_tokens {
                provider = provider.with_max_tokens(max_tokens);
            }
            if let Some(ref key) = spec.api_key {
                provider = provider.with_api_key(key);
            }
            Arc::new(provider)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_spec_with_model() {
        let spec = ProviderSpec::parse("gemini:gemini-1.5-pro").unwrap();
        assert_eq!(spec.kind, ProviderKind::Gemini);
        assert_eq!(spec.model.as_deref(), Some("gemini-1.5-pro"));
    }

    #[test]
    fn test_parse_spec_without_model() {
        let spec = ProviderSpec::parse("openai").unwrap();
        assert_eq!(spec.kind, ProviderKind::OpenAi);
        assert!(spec.model.is_none());
        assert!(ProviderSpec::parse("mistral").is_none());
    }

    #[test]
    fn test_create_provider_applies_model() {
        let mut spec = ProviderSpec::new(ProviderKind::Gemini);
        spec.model = Some("gemini-2.0-flash".to_string());
        let provider = create_provider(&spec);
        assert_eq!(provider.metadata().model, "gemini-2.0-flash");

        let provider = create_provider(&ProviderSpec::new(ProviderKind::OpenAi));
        assert_eq!(provider.metadata().model, "gpt-4o-2024-08-06");
    }

    #[test]
    fn test_api_key_not_serialized() {
        let mut spec = ProviderSpec::new(ProviderKind::OpenAi);
        spec.api_key = Some("sk-secret".to_string());
        let json = serde_json::to_string(&spec).unwrap();
        assert!(!json.contains("sk-secret"));
    }
}
