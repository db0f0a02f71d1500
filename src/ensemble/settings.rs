//! Tunable thresholds and weights for the ensemble pipeline.
//!
//! Every heuristic constant lives here so deployments can retune detection,
//! significance, selection and confidence from the config file without
//! touching the pipeline code.

use serde::{Deserialize, Serialize};

/// How numeric tokens are compared between candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NumericMode {
    /// Align every number by its surrounding text.
    #[default]
    Contextual,
    /// Compare only currency-formatted amounts, by count and ordinal.
    CurrencyOnly,
}

/// Rule used to decide whether disagreements need adjudication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SignificanceStrategy {
    /// Per-type confidence thresholds plus a breadth rule.
    #[default]
    TypeThresholds,
    /// Numeric disagreements judged by the size of the monetary difference.
    NumericMagnitude,
}

/// Heuristic used to pick between two candidates without adjudication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Weighted quality score.
    #[default]
    Quality,
    /// Strictly longer text wins.
    Length,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    pub numeric_mode: NumericMode,
    /// Context characters on each side of a decimal or grouped number.
    pub decimal_context_chars: usize,
    /// Context characters on each side of a bare integer.
    pub integer_context_chars: usize,
    pub number_confidence: f64,
    pub currency_count_confidence: f64,
    pub currency_value_confidence: f64,
    pub table_count_confidence: f64,
    /// Paired tables below this similarity disagree.
    pub table_similarity_threshold: f64,
    /// Cleaned prose below this similarity disagrees.
    pub text_similarity_threshold: f64,
    pub header_confidence: f64,
    pub list_confidence: f64,
    pub field_level: bool,
    pub field_mismatch_confidence: f64,
    pub field_missing_confidence: f64,
    pub date_comparison: bool,
    pub date_confidence: f64,
    /// Maximum characters kept from a table snippet.
    pub snippet_chars: usize,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            numeric_mode: NumericMode::default(),
            decimal_context_chars: 30,
            integer_context_chars: 20,
            number_confidence: 0.9,
            currency_count_confidence: 0.9,
            currency_value_confidence: 0.85,
            table_count_confidence: 0.8,
            table_similarity_threshold: 0.85,
            text_similarity_threshold: 0.7,
            header_confidence: 0.7,
            list_confidence: 0.6,
            field_level: true,
            field_mismatch_confidence: 0.95,
            field_missing_confidence: 0.85,
            date_comparison: true,
            date_confidence: 0.85,
            snippet_chars: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignificanceSettings {
    pub strategy: SignificanceStrategy,
    pub numbers_threshold: f64,
    pub tables_threshold: f64,
    pub text_threshold: f64,
    pub structure_threshold: f64,
    /// This many disagreements above `breadth_threshold` are significant.
    pub breadth_count: usize,
    pub breadth_threshold: f64,
    /// Absolute monetary difference that is always material.
    pub absolute_bound: f64,
    /// Relative difference (fraction of the larger value) that is material.
    pub relative_bound: f64,
}

impl Default for SignificanceSettings {
    fn default() -> Self {
        Self {
            strategy: SignificanceStrategy::default(),
            numbers_threshold: 0.8,
            tables_threshold: 0.7,
            text_threshold: 0.6,
            structure_threshold: 0.75,
            breadth_count: 3,
            breadth_threshold: 0.4,
            absolute_bound: 10.0,
            relative_bound: 0.2,
        }
    }
}

/// Weights of the selection quality score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub table_bonus: f64,
    pub table_consistency_bonus: f64,
    pub separator_bonus: f64,
    pub per_number: f64,
    pub numeric_cap: f64,
    pub symbol_bonus: f64,
    pub per_line: f64,
    pub line_cap: f64,
    pub key_value_bonus: f64,
    pub keyword_bonus: f64,
    pub date_bonus: f64,
    pub length_weight: f64,
    pub length_cap: f64,
    pub long_line_penalty: f64,
    pub low_diversity_penalty: f64,
    pub placeholder_penalty: f64,
    /// Fraction of placeholder characters tolerated before penalizing.
    pub placeholder_ratio: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            table_bonus: 1.0,
            table_consistency_bonus: 0.5,
            separator_bonus: 0.3,
            per_number: 0.1,
            numeric_cap: 2.0,
            symbol_bonus: 0.5,
            per_line: 0.05,
            line_cap: 1.0,
            key_value_bonus: 0.3,
            keyword_bonus: 0.2,
            date_bonus: 0.3,
            length_weight: 0.3,
            length_cap: 1.0,
            long_line_penalty: 1.0,
            low_diversity_penalty: 1.0,
            placeholder_penalty: 1.0,
            placeholder_ratio: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionSettings {
    pub policy: SelectionPolicy,
    /// Scores closer than this are a tie.
    pub tie_epsilon: f64,
    pub weights: QualityWeights,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            policy: SelectionPolicy::default(),
            tie_epsilon: 0.05,
            weights: QualityWeights::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjudicationSettings {
    /// Combined candidate length up to which both full documents are sent.
    pub full_prompt_max_chars: usize,
    /// Conflicts included in a focused prompt.
    pub focused_max_conflicts: usize,
    /// Characters of surrounding text per conflict in a focused prompt.
    pub window_chars: usize,
}

impl Default for AdjudicationSettings {
    fn default() -> Self {
        Self {
            full_prompt_max_chars: 6000,
            focused_max_conflicts: 5,
            window_chars: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceSettings {
    pub baseline: f64,
    pub both_failed: f64,
    pub single_failure: f64,
    /// Final documents shorter than this are near-empty.
    pub min_final_chars: usize,
    pub empty_penalty: f64,
    pub per_disagreement_penalty: f64,
    pub max_disagreement_penalty: f64,
    pub success_bonus: f64,
    pub bonus_min_chars: usize,
    /// Below this the single-model fallback runs.
    pub fallback_threshold: f64,
}

impl Default for ConfidenceSettings {
    fn default() -> Self {
        Self {
            baseline: 0.9,
            both_failed: 0.2,
            single_failure: 0.7,
            min_final_chars: 20,
            empty_penalty: 0.4,
            per_disagreement_penalty: 0.03,
            max_disagreement_penalty: 0.15,
            success_bonus: 0.05,
            bonus_min_chars: 100,
            fallback_threshold: 0.4,
        }
    }
}

/// All pipeline tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleSettings {
    pub detector: DetectorSettings,
    pub significance: SignificanceSettings,
    pub selection: SelectionSettings,
    pub adjudication: AdjudicationSettings,
    pub confidence: ConfidenceSettings,
    /// Provider output shorter than this (after trimming) counts as a failure.
    pub min_provider_chars: usize,
    /// Wall-clock limit per provider call; 0 disables it.
    pub provider_timeout_secs: u64,
    /// Run primary and secondary extraction in parallel.
    pub concurrent_extraction: bool,
}

impl Default for EnsembleSettings {
    fn default() -> Self {
        Self {
            detector: DetectorSettings::default(),
            significance: SignificanceSettings::default(),
            selection: SelectionSettings::default(),
            adjudication: AdjudicationSettings::default(),
            confidence: ConfidenceSettings::default(),
            min_provider_chars: 5,
            provider_timeout_secs: 120,
            concurrent_extraction: true,
        }
    }
}

impl EnsembleSettings {
    /// Per-call timeout, if enabled.
    pub fn provider_timeout(&self) -> Option<std::time::Duration> {
        (self.provider_timeout_secs > 0)
            .then(|| std::time::Duration::from_secs(self.provider_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_str = r#"
min_provider_chars = 10

[significance]
strategy = "numeric_magnitude"
absolute_bound = 5.0

[detector]
numeric_mode = "currency_only"
"#;
        let settings: EnsembleSettings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.min_provider_chars, 10);
        assert_eq!(
            settings.significance.strategy,
            SignificanceStrategy::NumericMagnitude
        );
        assert_eq!(settings.significance.absolute_bound, 5.0);
        assert_eq!(settings.significance.relative_bound, 0.2);
        assert_eq!(settings.detector.numeric_mode, NumericMode::CurrencyOnly);
        assert_eq!(settings.confidence.baseline, 0.9);
        assert!(settings.concurrent_extraction);
    }

    #[test]
    fn test_timeout_zero_disables() {
        let mut settings = EnsembleSettings::default();
        assert_eq!(
            settings.provider_timeout(),
            Some(std::time::Duration::from_secs(120))
        );
        settings.provider_timeout_secs = 0;
        assert!(settings.provider_timeout().is_none());
    }
}
