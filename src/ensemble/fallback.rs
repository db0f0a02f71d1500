//! Single-model extraction used when the ensemble result is not trusted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::llm::{JsonExtractor, LlmError};
use crate::providers::{guarded_extract, OcrProvider, ProviderError};

/// Tag an extractor puts on a placeholder result it could not fill.
const EXTRACTION_ERROR_KEY: &str = "_extraction_error";

#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("Fallback extraction failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Fallback JSON extraction failed: {0}")]
    Json(#[from] LlmError),
}

/// Result of a fallback run.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackOutcome {
    /// Markdown the fallback extracted.
    pub markdown: String,
    pub extracted_json: Value,
    /// Provider used.
    pub provider: String,
}

/// Best-effort replacement extraction path.
#[async_trait]
pub trait FallbackExtractor: Send + Sync {
    fn name(&self) -> String;

    async fn run(&self, image: &[u8], schema: &Value) -> Result<FallbackOutcome, FallbackError>;
}

/// One provider extraction followed by JSON extraction.
pub struct SingleModelFallback {
    provider: Arc<dyn OcrProvider>,
    json: Arc<dyn JsonExtractor>,
    min_chars: usize,
    timeout: Option<Duration>,
}

impl SingleModelFallback {
    pub fn new(provider: Arc<dyn OcrProvider>, json: Arc<dyn JsonExtractor>) -> Self {
        Self {
            provider,
            json,
            min_chars: 5,
            timeout: None,
        }
    }

    pub fn with_min_chars(mut self, min_chars: usize) -> Self {
        self.min_chars = min_chars;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl FallbackExtractor for SingleModelFallback {
    fn name(&self) -> String {
        self.provider.name()
    }

    async fn run(&self, image: &[u8], schema: &Value) -> Result<FallbackOutcome, FallbackError> {
        let markdown = guarded_extract(
            self.provider.as_ref(),
            image,
            None,
            self.timeout,
            self.min_chars,
        )
        .await?;
        let extracted_json = self.json.extract(&markdown, schema).await?;
        if let Some(message) = extracted_json.get(EXTRACTION_ERROR_KEY) {
            return Err(FallbackError::Json(LlmError::Parse(
                message.as_str().unwrap_or("extraction error").to_string(),
            )));
        }
        Ok(FallbackOutcome {
            markdown,
            extracted_json,
            provider: self.provider.name(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderMetadata;
    use serde_json::json;

    struct FixedProvider(&'static str);

    #[async_trait]
    impl OcrProvider for FixedProvider {
        fn name(&self) -> String {
            "fixed".to_string()
        }

        fn metadata(&self) -> ProviderMetadata {
            ProviderMetadata {
                provider: "test".to_string(),
                model: "fixed".to_string(),
                capabilities: vec![],
                max_tokens: 0,
                supports_context: false,
            }
        }

        async fn extract(&self, _image: &[u8]) -> Result<String, ProviderError> {
            Ok(self.0.to_string())
        }
    }

    struct EchoJson;

    #[async_trait]
    impl JsonExtractor for EchoJson {
        async fn extract(&self, markdown: &str, _schema: &Value) -> Result<Value, LlmError> {
            Ok(json!({ "text": markdown }))
        }
    }

    #[tokio::test]
    async fn test_runs_provider_then_json() {
        let fallback =
            SingleModelFallback::new(Arc::new(FixedProvider("  # Receipt\nTotal: 5  ")), Arc::new(EchoJson));
        let outcome = fallback.run(b"img", &json!({})).await.unwrap();
        assert_eq!(outcome.markdown, "# Receipt\nTotal: 5");
        assert_eq!(outcome.extracted_json["text"], "# Receipt\nTotal: 5");
        assert_eq!(outcome.provider, "fixed");
    }

    struct BrokenJson;

    #[async_trait]
    impl JsonExtractor for BrokenJson {
        async fn extract(&self, _markdown: &str, _schema: &Value) -> Result<Value, LlmError> {
            Err(LlmError::Connection("refused".to_string()))
        }
    }

    struct TaggedJson;

    #[async_trait]
    impl JsonExtractor for TaggedJson {
        async fn extract(&self, _markdown: &str, _schema: &Value) -> Result<Value, LlmError> {
            Ok(json!({ "total": null, "_extraction_error": "model unavailable" }))
        }
    }

    #[tokio::test]
    async fn test_json_failure_is_an_error() {
        let fallback = SingleModelFallback::new(
            Arc::new(FixedProvider("# Receipt\nTotal: 5")),
            Arc::new(BrokenJson),
        );
        let err = fallback.run(b"img", &json!({})).await.unwrap_err();
        assert!(matches!(err, FallbackError::Json(LlmError::Connection(_))));
    }

    #[tokio::test]
    async fn test_error_tagged_json_is_an_error() {
        let fallback = SingleModelFallback::new(
            Arc::new(FixedProvider("# Receipt\nTotal: 5")),
            Arc::new(TaggedJson),
        );
        let err = fallback.run(b"img", &json!({})).await.unwrap_err();
        assert!(matches!(err, FallbackError::Json(_)));
        assert!(err.to_string().contains("model unavailable"));
    }

    #[tokio::test]
    async fn test_minimal_output_is_an_error() {
        let fallback = SingleModelFallback::new(Arc::new(FixedProvider("ok")), Arc::new(EchoJson));
        let err = fallback.run(b"img", &json!({})).await.unwrap_err();
        assert!(matches!(err, FallbackError::Provider(_)));
    }
}
