//! Disagreement records produced by comparing two candidate documents.

use serde::{Deserialize, Serialize};

/// Category of a detected disagreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisagreementType {
    Numbers,
    Tables,
    TextContent,
    Structure,
}

impl DisagreementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisagreementType::Numbers => "numbers",
            DisagreementType::Tables => "tables",
            DisagreementType::TextContent => "text_content",
            DisagreementType::Structure => "structure",
        }
    }
}

impl std::fmt::Display for DisagreementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A located, typed, confidence-scored difference between two documents.
///
/// `content_a` always comes from the first (primary) document and
/// `content_b` from the second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disagreement {
    #[serde(rename = "type")]
    pub kind: DisagreementType,
    pub location: String,
    pub content_a: String,
    pub content_b: String,
    /// Likelihood in [0, 1] that this is a material conflict rather than noise.
    pub confidence: f64,
}

impl Disagreement {
    pub fn new(
        kind: DisagreementType,
        location: impl Into<String>,
        content_a: impl Into<String>,
        content_b: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            kind,
            location: location.into(),
            content_a: content_a.into(),
            content_b: content_b.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// One-line human-readable description.
    pub fn summary(&self) -> String {
        format!(
            "{} at {}: '{}' vs '{}' (confidence {:.2})",
            self.kind.as_str().to_uppercase(),
            self.location,
            self.content_a,
            self.content_b,
            self.confidence
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_is_clamped() {
        let d = Disagreement::new(DisagreementType::Tables, "Table 1", "a", "b", 1.7);
        assert_eq!(d.confidence, 1.0);
        let d = Disagreement::new(DisagreementType::Tables, "Table 1", "a", "b", -0.2);
        assert_eq!(d.confidence, 0.0);
    }

    #[test]
    fn test_serializes_type_field() {
        let d = Disagreement::new(DisagreementType::TextContent, "Overall content", "x", "y", 0.5);
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["type"], "text_content");
        assert_eq!(json["content_a"], "x");
        assert_eq!(json["confidence"], 0.5);
    }
}
