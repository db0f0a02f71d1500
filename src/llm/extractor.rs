//! Markdown-to-JSON extraction against a caller-supplied schema.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::client::{LlmClient, LlmError};
use super::config::LlmConfig;
use super::prompts;

/// Keys whose string values must look numeric.
const NUMERIC_KEY_HINTS: &[&str] = &["total", "amount", "price", "cost"];

/// Turns the final markdown into schema-shaped JSON.
#[async_trait]
pub trait JsonExtractor: Send + Sync {
    async fn extract(&self, markdown: &str, schema: &Value) -> Result<Value, LlmError>;
}

/// JSON extraction backed by a chat model in JSON mode.
///
/// Unparseable or invalid replies are retried up to `max_retries` times. A
/// reply that never validates is returned tagged `_extraction_warning`. A
/// hard failure is logged and returned as the error, so callers decide what
/// an unusable extraction means for them.
pub struct LlmJsonExtractor {
    client: LlmClient,
}

impl LlmJsonExtractor {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: LlmClient::new(config),
        }
    }

    pub fn model(&self) -> &str {
        &self.client.config().model
    }

    async fn extract_with_retries(&self, markdown: &str, schema: &Value) -> Result<Value, LlmError> {
        let system = prompts::build_system_prompt(schema);
        let user = prompts::build_user_prompt(schema, self.client.truncate_content(markdown));
        let max_retries = self.client.config().max_retries;

        for attempt in 0..=max_retries {
            let is_last = attempt == max_retries;
            let raw = self.client.complete_json(&system, &user).await?;

            let result = match parse_json_reply(&raw) {
                Ok(value) => value,
                Err(e) if is_last => {
                    return Err(LlmError::Parse(format!(
                        "JSON parsing failed after {} attempts: {}",
                        max_retries + 1,
                        e
                    )));
                }
                Err(e) => {
                    debug!("Attempt {} returned invalid JSON: {}", attempt + 1, e);
                    continue;
                }
            };

            if validate_extraction(&result, schema) {
                return Ok(result);
            }
            if is_last {
                return Ok(tag_result(result, "_extraction_warning", "Validation failed"));
            }
            debug!("Attempt {} failed validation, retrying", attempt + 1);
        }

        Err(LlmError::Parse("no extraction attempts were made".to_string()))
    }
}

#[async_trait]
impl JsonExtractor for LlmJsonExtractor {
    async fn extract(&self, markdown: &str, schema: &Value) -> Result<Value, LlmError> {
        self.extract_with_retries(markdown, schema)
            .await
            .inspect_err(|e| warn!("JSON extraction failed: {}", e))
    }
}

/// Parse a model reply, tolerating a surrounding markdown code fence.
pub fn parse_json_reply(raw: &str) -> Result<Value, serde_json::Error> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim())
}

/// Required fields present and non-null; numeric-looking keys hold
/// numeric-looking strings.
pub fn validate_extraction(result: &Value, schema: &Value) -> bool {
    let Some(object) = result.as_object() else {
        return false;
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            match object.get(field) {
                None | Some(Value::Null) => return false,
                _ => {}
            }
        }
    }

    object.iter().all(|(key, value)| {
        let key = key.to_lowercase();
        match value {
            Value::String(s) if NUMERIC_KEY_HINTS.iter().any(|hint| key.contains(hint)) => {
                s.is_empty() || s.chars().any(|c| c.is_ascii_digit() || ".$,".contains(c))
            }
            _ => true,
        }
    })
}

/// Empty value per schema property: arrays become `[]`, objects `{}`,
/// everything else `null`.
pub fn empty_structure(schema: &Value) -> Value {
    let mut result = Map::new();
    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, field) in properties {
            let empty = match field.get("type").and_then(Value::as_str) {
                Some("array") => Value::Array(Vec::new()),
                Some("object") => Value::Object(Map::new()),
                _ => Value::Null,
            };
            result.insert(name.clone(), empty);
        }
    }
    Value::Object(result)
}

/// Add a string marker to an object result; non-objects are wrapped.
pub fn tag_result(value: Value, key: &str, message: &str) -> Value {
    let mut object = match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    };
    object.insert(key.to_string(), Value::String(message.to_string()));
    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn invoice_schema() -> Value {
        json!({
            "type": "object",
            "required": ["total"],
            "properties": {
                "total": {"type": "string"},
                "items": {"type": "array"},
                "vendor": {"type": "object"},
                "date": {"type": "string"}
            }
        })
    }

    #[test]
    fn test_parse_json_reply_strips_fences() {
        let value = parse_json_reply("```json\n{\"total\": \"$5.00\"}\n```").unwrap();
        assert_eq!(value["total"], "$5.00");
        assert!(parse_json_reply("{\"a\": 1}").is_ok());
        assert!(parse_json_reply("not json").is_err());
    }

    #[test]
    fn test_validation_requires_fields() {
        let schema = invoice_schema();
        assert!(validate_extraction(&json!({"total": "$5.00"}), &schema));
        assert!(!validate_extraction(&json!({"total": null}), &schema));
        assert!(!validate_extraction(&json!({"date": "2024-01-01"}), &schema));
        assert!(!validate_extraction(&json!([1, 2]), &schema));
    }

    #[test]
    fn test_validation_rejects_wordy_amounts() {
        let schema = json!({});
        assert!(!validate_extraction(&json!({"total_amount": "five dollars"}), &schema));
        assert!(validate_extraction(&json!({"unit_price": "$5"}), &schema));
        assert!(validate_extraction(&json!({"total": 5.0}), &schema));
    }

    #[test]
    fn test_empty_structure_follows_property_types() {
        let empty = empty_structure(&invoice_schema());
        assert_eq!(
            empty,
            json!({"total": null, "items": [], "vendor": {}, "date": null})
        );
        assert_eq!(empty_structure(&json!({"type": "object"})), json!({}));
    }

    #[test]
    fn test_tag_wraps_non_objects() {
        let tagged = tag_result(json!({"a": 1}), "_extraction_warning", "Validation failed");
        assert_eq!(tagged["_extraction_warning"], "Validation failed");
        let wrapped = tag_result(json!([1]), "_extraction_error", "boom");
        assert_eq!(wrapped["result"], json!([1]));
    }

    #[tokio::test]
    async fn test_hard_failure_is_returned_as_error() {
        let mut config = LlmConfig::base_default();
        config.api_key = None;
        let extractor = LlmJsonExtractor::new(config);
        let err = extractor
            .extract("# Doc", &invoice_schema())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }
}
