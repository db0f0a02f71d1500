//! Accuracy metrics for OCR output against ground truth.
//!
//! Markdown transcriptions are scored by character and word error rates,
//! word and table-cell overlap, table shape agreement and overall sequence
//! similarity. Extracted JSON is scored by serialization similarity and
//! path-by-path field agreement. A dataset of samples rolls up into means over
//! the successful samples.

mod json_metrics;
mod markdown_metrics;
mod normalize;

pub use json_metrics::{
    canonical_string, evaluate_json, field_level_accuracy, flatten, json_similarity,
    semantic_json_similarity, JsonScores,
};
pub use markdown_metrics::{
    cer, evaluate_markdown, extract_tables, sequence_similarity, table_accuracy,
    table_structure_accuracy, wer, word_accuracy, MarkdownScores, Table, TableStructure,
};
pub use normalize::{html_table_to_markdown, normalize_text};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One ground-truth sample with the pipeline's predictions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationSample {
    #[serde(default, alias = "id")]
    pub sample_id: String,
    #[serde(default, alias = "ground_truth_markdown")]
    pub reference_markdown: Option<String>,
    #[serde(default, alias = "markdown_prediction")]
    pub predicted_markdown: Option<String>,
    #[serde(default, alias = "ground_truth_json")]
    pub reference_json: Option<Value>,
    #[serde(default, alias = "json_prediction")]
    pub predicted_json: Option<Value>,
    /// Whether the pipeline produced output for this sample.
    #[serde(default = "default_success", alias = "ocr_success")]
    pub success: bool,
}

fn default_success() -> bool {
    true
}

impl Default for EvaluationSample {
    fn default() -> Self {
        Self {
            sample_id: String::new(),
            reference_markdown: None,
            predicted_markdown: None,
            reference_json: None,
            predicted_json: None,
            success: default_success(),
        }
    }
}

impl EvaluationSample {
    fn markdown_scores(&self) -> Option<(MarkdownScores, bool)> {
        let reference = self.reference_markdown.as_deref()?;
        Some(match self.predicted_markdown.as_deref() {
            Some(predicted) if self.success && !predicted.trim().is_empty() => {
                (evaluate_markdown(reference, predicted), true)
            }
            _ => (MarkdownScores::failed(), false),
        })
    }

    fn json_scores(&self) -> Option<(JsonScores, bool)> {
        let reference = self.reference_json.as_ref()?;
        Some(match self.predicted_json.as_ref() {
            Some(predicted) if self.success && !predicted.is_null() => {
                (evaluate_json(reference, predicted), true)
            }
            _ => (JsonScores::failed(), false),
        })
    }
}

/// Per-sample scores. A side without ground truth is omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleResult {
    pub sample_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<MarkdownScores>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<JsonScores>,
}

/// Aggregate over every sample that carries ground truth for one side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary<S> {
    pub total_samples: usize,
    pub successful_samples: usize,
    pub success_rate: f64,
    /// Means over the successful samples.
    pub mean: S,
}

impl<S> Summary<S> {
    fn new(total_samples: usize, successful: usize, mean: S) -> Self {
        let success_rate = if total_samples == 0 {
            0.0
        } else {
            successful as f64 / total_samples as f64
        };
        Self {
            total_samples,
            successful_samples: successful,
            success_rate,
            mean,
        }
    }
}

/// Result of evaluating a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub samples: Vec<SampleResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<Summary<MarkdownScores>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<Summary<JsonScores>>,
}

/// Score every sample and summarize each side that has ground truth.
pub fn evaluate_dataset(samples: &[EvaluationSample]) -> EvaluationReport {
    let mut results = Vec::with_capacity(samples.len());
    let mut markdown_total = 0;
    let mut markdown_ok = Vec::new();
    let mut json_total = 0;
    let mut json_ok = Vec::new();

    for sample in samples {
        let markdown = sample.markdown_scores();
        let json = sample.json_scores();

        if let Some((ref scores, ok)) = markdown {
            markdown_total += 1;
            if ok {
                markdown_ok.push(*scores);
            }
        }
        if let Some((ref scores, ok)) = json {
            json_total += 1;
            if ok {
                json_ok.push(scores.clone());
            }
        }

        let succeeded = markdown.as_ref().map_or(true, |(_, ok)| *ok)
            && json.as_ref().map_or(true, |(_, ok)| *ok);
        results.push(SampleResult {
            sample_id: sample.sample_id.clone(),
            success: sample.success && succeeded,
            markdown: markdown.map(|(scores, _)| scores),
            json: json.map(|(scores, _)| scores),
        });
    }

    tracing::debug!(
        "Evaluated {} samples ({} markdown, {} json)",
        samples.len(),
        markdown_total,
        json_total
    );

    EvaluationReport {
        samples: results,
        markdown: (markdown_total > 0).then(|| {
            Summary::new(markdown_total, markdown_ok.len(), MarkdownScores::mean(&markdown_ok))
        }),
        json: (json_total > 0)
            .then(|| Summary::new(json_total, json_ok.len(), JsonScores::mean(&json_ok))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dataset_file_aliases() {
        let samples: Vec<EvaluationSample> = serde_json::from_value(json!([
            {
                "sample_id": "s1",
                "ground_truth_markdown": "Total: $5",
                "markdown_prediction": "Total: $5",
                "ocr_success": true
            },
            { "id": "s2", "ground_truth_json": {"total": 5} }
        ]))
        .unwrap();
        assert_eq!(samples[0].reference_markdown.as_deref(), Some("Total: $5"));
        assert_eq!(samples[1].sample_id, "s2");
        assert!(samples[1].success);
        assert!(samples[1].predicted_json.is_none());
    }

    #[test]
    fn test_failed_samples_lower_success_rate_not_means() {
        let samples = vec![
            EvaluationSample {
                sample_id: "good".to_string(),
                reference_markdown: Some("Total: $5".to_string()),
                predicted_markdown: Some("Total: $5".to_string()),
                ..Default::default()
            },
            EvaluationSample {
                sample_id: "failed".to_string(),
                reference_markdown: Some("Total: $7".to_string()),
                predicted_markdown: Some("Total: $7".to_string()),
                success: false,
                ..Default::default()
            },
        ];
        let report = evaluate_dataset(&samples);

        let summary = report.markdown.unwrap();
        assert_eq!(summary.total_samples, 2);
        assert_eq!(summary.successful_samples, 1);
        assert!((summary.success_rate - 0.5).abs() < 1e-9);
        assert_eq!(summary.mean.cer, 0.0);
        assert!(report.json.is_none());

        assert!(report.samples[0].success);
        assert!(!report.samples[1].success);
        assert_eq!(report.samples[1].markdown, Some(MarkdownScores::failed()));
    }

    #[test]
    fn test_missing_prediction_counts_as_failure() {
        let samples = vec![EvaluationSample {
            sample_id: "json-only".to_string(),
            reference_json: Some(json!({"total": 5.0})),
            ..Default::default()
        }];
        let report = evaluate_dataset(&samples);
        let summary = report.json.unwrap();
        assert_eq!(summary.successful_samples, 0);
        assert_eq!(summary.mean, JsonScores::failed());
        assert!(!report.samples[0].success);
    }
}
