//! OCR provider abstraction for the ensemble pipeline.
//!
//! A provider turns the bytes of one rendered page into markdown text.
//! Concrete backends (OpenAI-compatible vision models, Gemini) implement
//! [`OcrProvider`]; the orchestrator only ever sees the trait object, so
//! tests can substitute stub providers.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from OCR providers.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider not available: {0}")]
    NotAvailable(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Rate limited by {provider}, retry after {retry_after_secs:?}s")]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    #[error("{provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Output too short: {chars} chars (minimum {min})")]
    InsufficientOutput { chars: usize, min: usize },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Available provider backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI chat-completions vision API (GPT-4o).
    #[default]
    OpenAi,
    /// Groq's OpenAI-compatible vision API.
    Groq,
    /// Google Gemini generateContent API.
    Gemini,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Groq => "groq",
            ProviderKind::Gemini => "gemini",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "openai" | "gpt4o" | "gpt-4o" => Some(ProviderKind::OpenAi),
            "groq" => Some(ProviderKind::Groq),
            "gemini" | "google" => Some(ProviderKind::Gemini),
            _ => None,
        }
    }

    /// Model used when the configuration does not name one.
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o-2024-08-06",
            ProviderKind::Groq => "meta-llama/llama-4-scout-17b-16e-instruct",
            ProviderKind::Gemini => "gemini-1.5-flash",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Descriptive information about a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Vendor name (e.g., "OpenAI", "Google").
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Capability tags ("vision", "text", "markdown").
    pub capabilities: Vec<String>,
    /// Maximum output tokens requested per call.
    pub max_tokens: u32,
    /// Whether `extract_with_context` actually uses the instructions.
    pub supports_context: bool,
}

/// Trait for OCR providers.
///
/// Implementations must return an error on failure rather than empty text;
/// the pipeline additionally treats very short output as a failure.
#[async_trait]
pub trait OcrProvider: Send + Sync {
    /// Display name used in reports (e.g., "GPT-4o (gpt-4o-2024-08-06)").
    fn name(&self) -> String;

    /// Model and capability information.
    fn metadata(&self) -> ProviderMetadata;

    /// Extract markdown from a page image.
    async fn extract(&self, image: &[u8]) -> Result<String, ProviderError>;

    /// Extract markdown from a page image with additional instructions.
    ///
    /// Providers that cannot take instructions fall back to plain extraction.
    async fn extract_with_context(
        &self,
        image: &[u8],
        _instructions: &str,
    ) -> Result<String, ProviderError> {
        self.extract(image).await
    }
}

/// Run a provider call with an optional wall-clock limit.
///
/// A timeout is reported as an ordinary provider failure.
pub async fn extract_with_timeout<F>(
    provider_name: &str,
    timeout: Option<Duration>,
    call: F,
) -> Result<String, ProviderError>
where
    F: std::future::Future<Output = Result<String, ProviderError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| ProviderError::Timeout {
                provider: provider_name.to_string(),
                timeout: limit,
            })?,
        None => call.await,
    }
}

/// Trim provider output and reject it when it is too short to be usable.
pub fn validate_output(text: &str, min_chars: usize) -> Result<String, ProviderError> {
    let trimmed = text.trim();
    let chars = trimmed.chars().count();
    if chars < min_chars {
        return Err(ProviderError::InsufficientOutput {
            chars,
            min: min_chars,
        });
    }
    Ok(trimmed.to_string())
}

/// One guarded provider call: optional instructions, optional timeout,
/// and minimum-length validation of the trimmed output.
pub async fn guarded_extract(
    provider: &dyn OcrProvider,
    image: &[u8],
    instructions: Option<&str>,
    timeout: Option<Duration>,
    min_chars: usize,
) -> Result<String, ProviderError> {
    let name = provider.name();
    let text = match instructions {
        Some(instructions) => {
            extract_with_timeout(&name, timeout, provider.extract_with_context(image, instructions))
                .await?
        }
        None => extract_with_timeout(&name, timeout, provider.extract(image)).await?,
    };
    validate_output(&text, min_chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!(ProviderKind::from_str("OpenAI"), Some(ProviderKind::OpenAi));
        assert_eq!(ProviderKind::from_str("gpt-4o"), Some(ProviderKind::OpenAi));
        assert_eq!(ProviderKind::from_str("google"), Some(ProviderKind::Gemini));
        assert_eq!(ProviderKind::from_str("groq"), Some(ProviderKind::Groq));
        assert_eq!(ProviderKind::from_str("tesseract"), None);
    }

    #[test]
    fn test_validate_output_trims() {
        assert_eq!(validate_output("  # Title\n", 5).unwrap(), "# Title");
    }

    #[test]
    fn test_validate_output_rejects_minimal_text() {
        let err = validate_output("  ok \n", 5).unwrap_err();
        assert!(matches!(
            err,
            ProviderError::InsufficientOutput { chars: 2, min: 5 }
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_a_provider_error() {
        let result = extract_with_timeout("slow", Some(Duration::from_millis(10)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("never".to_string())
        })
        .await;
        assert!(matches!(result, Err(ProviderError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_no_timeout_passes_through() {
        let result = extract_with_timeout("fast", None, async { Ok("text".to_string()) }).await;
        assert_eq!(result.unwrap(), "text");
    }
}
