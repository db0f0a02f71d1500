//! Prompts for markdown-to-JSON extraction.

use serde_json::Value;

pub const JSON_EXTRACTION_BASE_PROMPT: &str = r#"You are a highly accurate OCR data extraction specialist.

ACCURACY REQUIREMENTS:
1. Numbers: extract exactly as written, every digit matters
2. Currency: keep exact amounts including decimals and symbols
3. Dates: keep the original format, do not reformat
4. Text: keep exact spelling and capitalization
5. Missing data: use null for missing fields, never guess

EXTRACTION RULES:"#;

pub const JSON_ONLY_FOOTER: &str =
    "Return ONLY valid JSON matching the provided schema. No explanations.";

/// Build the system prompt, adding guidance for the fields the schema names.
pub fn build_system_prompt(schema: &Value) -> String {
    let schema_text = schema.to_string().to_lowercase();
    let mut prompt = String::from(JSON_EXTRACTION_BASE_PROMPT);

    let guidance: [(&[&str], &str); 4] = [
        (&["total"], "- Extract total amounts with exact precision"),
        (&["date"], "- Preserve original date format"),
        (
            &["vendor", "company"],
            "- Extract company names with exact spelling",
        ),
        (
            &["items", "products"],
            "- Extract all line items with quantities and prices",
        ),
    ];
    for (keys, line) in guidance {
        if keys.iter().any(|k| schema_text.contains(k)) {
            prompt.push('\n');
            prompt.push_str(line);
        }
    }

    prompt.push_str("\n\n");
    prompt.push_str(JSON_ONLY_FOOTER);
    prompt
}

/// User message carrying the schema and the document.
pub fn build_user_prompt(schema: &Value, markdown: &str) -> String {
    let schema_text = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!("Schema: {}\n\nDocument:\n{}", schema_text, markdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_guidance_follows_schema() {
        let schema = json!({"properties": {"total": {"type": "number"}, "vendor_name": {"type": "string"}}});
        let prompt = build_system_prompt(&schema);
        assert!(prompt.contains("total amounts"));
        assert!(prompt.contains("company names"));
        assert!(!prompt.contains("line items"));
        assert!(prompt.ends_with(JSON_ONLY_FOOTER));
    }

    #[test]
    fn test_user_prompt_contains_document() {
        let prompt = build_user_prompt(&json!({"type": "object"}), "# Receipt");
        assert!(prompt.starts_with("Schema: {"));
        assert!(prompt.ends_with("Document:\n# Receipt"));
    }
}
