//! Trust estimate for a resolved ensemble result.

use super::settings::ConfidenceSettings;

/// What the assessor knows about a finished run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceInputs {
    pub primary_succeeded: bool,
    pub secondary_succeeded: bool,
    pub final_chars: usize,
    /// Disagreements left between the candidates.
    pub disagreement_count: usize,
    /// Adjudicated disagreements are resolved and not counted against the result.
    pub adjudicated: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ConfidenceAssessor {
    settings: ConfidenceSettings,
}

impl ConfidenceAssessor {
    pub fn new(settings: ConfidenceSettings) -> Self {
        Self { settings }
    }

    /// Confidence in [0, 1].
    pub fn assess(&self, inputs: &ConfidenceInputs) -> f64 {
        let s = &self.settings;

        if !inputs.primary_succeeded && !inputs.secondary_succeeded {
            return s.both_failed.clamp(0.0, 1.0);
        }

        let both_succeeded = inputs.primary_succeeded && inputs.secondary_succeeded;
        let mut confidence = if both_succeeded {
            s.baseline
        } else {
            s.single_failure
        };

        if inputs.final_chars < s.min_final_chars {
            confidence -= s.empty_penalty;
        }

        if !inputs.adjudicated {
            let penalty = inputs.disagreement_count as f64 * s.per_disagreement_penalty;
            confidence -= penalty.min(s.max_disagreement_penalty);
        }

        if both_succeeded && inputs.final_chars > s.bonus_min_chars {
            confidence += s.success_bonus;
        }

        confidence.clamp(0.0, 1.0)
    }

    /// Whether the result is too weak to keep.
    pub fn needs_fallback(&self, confidence: f64) -> bool {
        confidence < self.settings.fallback_threshold
    }

    pub fn fallback_threshold(&self) -> f64 {
        self.settings.fallback_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(primary: bool, secondary: bool, chars: usize, count: usize) -> ConfidenceInputs {
        ConfidenceInputs {
            primary_succeeded: primary,
            secondary_succeeded: secondary,
            final_chars: chars,
            disagreement_count: count,
            adjudicated: false,
        }
    }

    #[test]
    fn test_both_failed_is_low() {
        let assessor = ConfidenceAssessor::default();
        let confidence = assessor.assess(&inputs(false, false, 0, 0));
        assert_eq!(confidence, 0.2);
        assert!(assessor.needs_fallback(confidence));
    }

    #[test]
    fn test_single_failure_below_dual_success() {
        let assessor = ConfidenceAssessor::default();
        for count in 0..10 {
            for chars in [0, 10, 50, 500] {
                let dual = assessor.assess(&inputs(true, true, chars, count));
                let single = assessor.assess(&inputs(true, false, chars, count));
                assert!(single < dual, "count={count} chars={chars}");
                assert!((0.0..=1.0).contains(&dual));
                assert!((0.0..=1.0).contains(&single));
            }
        }
    }

    #[test]
    fn test_disagreement_penalty_is_capped() {
        let assessor = ConfidenceAssessor::default();
        let few = assessor.assess(&inputs(true, true, 50, 2));
        let many = assessor.assess(&inputs(true, true, 50, 100));
        assert!((few - 0.84).abs() < 1e-9);
        assert!((many - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_adjudicated_disagreements_not_penalized() {
        let assessor = ConfidenceAssessor::default();
        let mut run = inputs(true, true, 500, 4);
        run.adjudicated = true;
        assert!((assessor.assess(&run) - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_near_empty_output_triggers_fallback() {
        let assessor = ConfidenceAssessor::default();
        let confidence = assessor.assess(&inputs(false, true, 8, 0));
        assert!((confidence - 0.3).abs() < 1e-9);
        assert!(assessor.needs_fallback(confidence));
        assert!(!assessor.needs_fallback(assessor.assess(&inputs(true, true, 500, 0))));
    }
}
