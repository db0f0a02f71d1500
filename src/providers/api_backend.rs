//! Shared infrastructure for cloud vision providers (OpenAI, Groq, Gemini).
//!
//! Provides common helpers for image encoding, request pacing and
//! retry on rate limiting.

use std::future::Future;
use std::time::Duration;

use base64::Engine;
use reqwest::Response;
use tracing::{debug, warn};

use super::backend::ProviderError;

/// Maximum retry attempts on rate limit (429) errors.
const MAX_RETRIES: u32 = 3;

/// Upper bound for a single backoff wait.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// System prompt shared by the vision providers.
pub const SYSTEM_MARKDOWN_PROMPT: &str = "You are an OCR engine that converts document images to strict Markdown. \
Never change any digit, decimal, currency symbol or percentage. \
Use pipe-delimited Markdown tables that preserve the original structure. \
Extract all visible text and do not correct what you see.";

/// User prompt for plain extraction.
pub const USER_MARKDOWN_PROMPT: &str = "Extract ALL content of this image as valid Markdown. \
Every number must be exact, table structures must match the original layout, \
and no text may be skipped.";

/// Encode image bytes as base64, returning (base64_data, mime_type).
///
/// The MIME type is sniffed from the bytes; unknown content is sent as PNG.
pub fn encode_image_base64(image: &[u8]) -> (String, &'static str) {
    let mime_type = infer::get(image)
        .map(|kind| kind.mime_type())
        .filter(|mime| mime.starts_with("image/"))
        .unwrap_or("image/png");
    let data = base64::engine::general_purpose::STANDARD.encode(image);
    (data, mime_type)
}

/// Build a `data:` URL for an image.
pub fn image_data_url(image: &[u8]) -> String {
    let (data, mime_type) = encode_image_base64(image);
    format!("data:{};base64,{}", mime_type, data)
}

/// Read a delay in milliseconds from an environment variable.
pub fn get_delay_from_env(env_var: &str, default_ms: u64) -> Duration {
    std::env::var(env_var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(default_ms))
}

/// Apply a configurable pacing delay before an API request.
pub async fn apply_rate_delay(env_var: &str, default_ms: u64, provider_name: &str) {
    let delay = get_delay_from_env(env_var, default_ms);
    if delay > Duration::ZERO {
        debug!("{}: waiting {:?} before request", provider_name, delay);
        tokio::time::sleep(delay).await;
    }
}

/// Exponential backoff: base * 2^attempt, capped.
pub fn backoff_delay(attempt: u32, base_ms: u64) -> Duration {
    let factor = 1u64 << attempt.min(16);
    Duration::from_millis(base_ms.saturating_mul(factor)).min(MAX_BACKOFF)
}

/// Parse a Retry-After header given in seconds.
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs).min(MAX_BACKOFF))
}

/// Retry an API request on 429 (rate limited) responses with exponential backoff.
///
/// Returns the first non-429 response. If all retries are exhausted,
/// returns `ProviderError::RateLimited`.
pub async fn retry_on_rate_limit<F, Fut>(
    provider_name: &str,
    make_request: F,
) -> Result<Response, ProviderError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Response, ProviderError>>,
{
    let mut attempt = 0;
    loop {
        let response = make_request().await?;

        if response.status().as_u16() != 429 {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let retry_after_secs = retry_after.as_deref().and_then(|s| s.parse::<u64>().ok());

        if attempt >= MAX_RETRIES {
            return Err(ProviderError::RateLimited {
                provider: provider_name.to_string(),
                retry_after_secs,
            });
        }

        let wait =
            parse_retry_after(retry_after.as_deref()).unwrap_or_else(|| backoff_delay(attempt, 1000));

        warn!(
            "{} rate limited (attempt {}), waiting {:?}",
            provider_name,
            attempt + 1,
            wait
        );
        tokio::time::sleep(wait).await;
        attempt += 1;
    }
}

/// Turn a non-success HTTP response into a provider error.
pub async fn error_for_status(provider_name: &str, response: Response) -> Result<Response, ProviderError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::ExtractionFailed(format!(
        "{} API error ({}): {}",
        provider_name, status, body
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'];

    #[test]
    fn test_encode_detects_png() {
        let (_, mime) = encode_image_base64(PNG_MAGIC);
        assert_eq!(mime, "image/png");
    }

    #[test]
    fn test_encode_detects_jpeg() {
        let (_, mime) = encode_image_base64(JPEG_MAGIC);
        assert_eq!(mime, "image/jpeg");
    }

    #[test]
    fn test_unknown_bytes_default_to_png() {
        let url = image_data_url(b"not an image");
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        assert_eq!(backoff_delay(0, 1000), Duration::from_secs(1));
        assert_eq!(backoff_delay(2, 1000), Duration::from_secs(4));
        assert_eq!(backoff_delay(12, 1000), MAX_BACKOFF);
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(Some("7")), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after(Some("soon")), None);
        assert_eq!(parse_retry_after(None), None);
    }
}
