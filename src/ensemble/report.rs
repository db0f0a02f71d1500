//! Report types returned by the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::disagreement::Disagreement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Error,
}

/// How the final document was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionMethod {
    /// Heuristic choice between two successful candidates.
    #[serde(rename = "selection")]
    Selection,
    /// The adjudicator re-derived the document from the image.
    #[serde(rename = "adjudication")]
    Adjudication,
    /// The primary provider failed; the secondary's output is used.
    #[serde(rename = "primary_only")]
    PrimaryFailed,
    /// The secondary provider failed; the primary's output is used.
    #[serde(rename = "secondary_only")]
    SecondaryFailed,
    #[serde(rename = "both_failed")]
    BothFailed,
}

impl ResolutionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Selection => "selection",
            Self::Adjudication => "adjudication",
            Self::PrimaryFailed => "primary_only",
            Self::SecondaryFailed => "secondary_only",
            Self::BothFailed => "both_failed",
        }
    }
}

impl std::fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a markdown document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Primary,
    Secondary,
    Adjudicated,
    Fallback,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Adjudicated => "adjudicated",
            Self::Fallback => "fallback",
        }
    }
}

/// Trimmed markdown text with its provenance.
///
/// The text is either non-empty or the empty string, never absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownDocument {
    text: String,
    provenance: Provenance,
}

impl MarkdownDocument {
    pub fn new(text: impl AsRef<str>, provenance: Provenance) -> Self {
        Self {
            text: text.as_ref().trim().to_string(),
            provenance,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleResults {
    pub primary_markdown: String,
    pub secondary_markdown: String,
    pub disagreements: Vec<Disagreement>,
    pub disagreement_count: usize,
    pub has_significant_disagreements: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_method: Option<ResolutionMethod>,
    pub final_markdown: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_provenance: Option<Provenance>,
    pub extracted_json: Value,
    pub ensemble_confidence: f64,
    /// Set when adjudication was attempted and failed soft.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjudication_error: Option<String>,
}

impl Default for EnsembleResults {
    fn default() -> Self {
        Self {
            primary_markdown: String::new(),
            secondary_markdown: String::new(),
            disagreements: Vec::new(),
            disagreement_count: 0,
            has_significant_disagreements: false,
            resolution_method: None,
            final_markdown: String::new(),
            final_provenance: None,
            extracted_json: Value::Object(Default::default()),
            ensemble_confidence: 0.0,
            adjudication_error: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvidersUsed {
    pub primary: String,
    pub secondary: String,
    /// Only present when adjudication was attempted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjudicator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

/// Character counts per stage plus wall time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub primary_length: usize,
    pub secondary_length: usize,
    pub final_length: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderErrors {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,
}

impl ProviderErrors {
    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.secondary.is_none()
    }
}

/// Result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleReport {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub run_id: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    pub ensemble_results: EnsembleResults,
    pub providers_used: ProvidersUsed,
    pub processing_stats: ProcessingStats,
    #[serde(default, skip_serializing_if = "ProviderErrors::is_empty")]
    pub provider_errors: ProviderErrors,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub ensemble_fallback: bool,
    /// Confidence that triggered the fallback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_confidence: Option<f64>,
}

impl EnsembleReport {
    /// An empty report for `run_id`, filled in by the orchestrator.
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            error: None,
            run_id: run_id.into(),
            started_at: Utc::now(),
            ensemble_results: EnsembleResults::default(),
            providers_used: ProvidersUsed::default(),
            processing_stats: ProcessingStats::default(),
            provider_errors: ProviderErrors::default(),
            image_sha256: None,
            mime_type: None,
            ensemble_fallback: false,
            fallback_confidence: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Mark the run failed, discarding any partial ensemble output.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = Status::Error;
        self.error = Some(message.into());
        self.ensemble_results = EnsembleResults::default();
    }
}
