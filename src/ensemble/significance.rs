//! Decides whether detected disagreements warrant adjudication.

use super::disagreement::{Disagreement, DisagreementType};
use super::markdown;
use super::settings::{SignificanceSettings, SignificanceStrategy};

/// Deterministic, side-effect-free significance rule.
#[derive(Debug, Clone, Default)]
pub struct SignificancePolicy {
    settings: SignificanceSettings,
}

impl SignificancePolicy {
    pub fn new(settings: SignificanceSettings) -> Self {
        Self { settings }
    }

    pub fn strategy(&self) -> SignificanceStrategy {
        self.settings.strategy
    }

    /// Whether the disagreements are material enough to adjudicate.
    pub fn is_significant(&self, disagreements: &[Disagreement]) -> bool {
        match self.settings.strategy {
            SignificanceStrategy::TypeThresholds => {
                if disagreements.iter().any(|d| self.exceeds_type_threshold(d)) {
                    return true;
                }
                let moderate = disagreements
                    .iter()
                    .filter(|d| d.confidence > self.settings.breadth_threshold)
                    .count();
                moderate >= self.settings.breadth_count
            }
            SignificanceStrategy::NumericMagnitude => disagreements.iter().any(|d| {
                if d.kind == DisagreementType::Numbers {
                    self.numeric_difference_is_material(d)
                } else {
                    self.exceeds_type_threshold(d)
                }
            }),
        }
    }

    fn threshold_for(&self, kind: DisagreementType) -> f64 {
        match kind {
            DisagreementType::Numbers => self.settings.numbers_threshold,
            DisagreementType::Tables => self.settings.tables_threshold,
            DisagreementType::TextContent => self.settings.text_threshold,
            DisagreementType::Structure => self.settings.structure_threshold,
        }
    }

    /// Strictly above: a disagreement sitting on its threshold is not enough.
    fn exceeds_type_threshold(&self, d: &Disagreement) -> bool {
        d.confidence > self.threshold_for(d.kind)
    }

    /// Both sides parse as amounts: compare the difference against the
    /// absolute and relative bounds. Otherwise fall back to the numbers
    /// threshold.
    fn numeric_difference_is_material(&self, d: &Disagreement) -> bool {
        match (
            markdown::parse_amount(&d.content_a),
            markdown::parse_amount(&d.content_b),
        ) {
            (Some(a), Some(b)) => {
                let diff = (a - b).abs();
                let scale = a.abs().max(b.abs());
                let relative = if scale > 0.0 { diff / scale } else { 0.0 };
                diff > self.settings.absolute_bound || relative > self.settings.relative_bound
            }
            _ => self.exceeds_type_threshold(d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(a: &str, b: &str, confidence: f64) -> Disagreement {
        Disagreement::new(DisagreementType::Numbers, "Total: $", a, b, confidence)
    }

    fn magnitude_policy() -> SignificancePolicy {
        SignificancePolicy::new(SignificanceSettings {
            strategy: SignificanceStrategy::NumericMagnitude,
            ..Default::default()
        })
    }

    #[test]
    fn test_empty_is_not_significant() {
        assert!(!SignificancePolicy::default().is_significant(&[]));
        assert!(!magnitude_policy().is_significant(&[]));
    }

    #[test]
    fn test_type_thresholds() {
        let policy = SignificancePolicy::default();
        assert!(policy.is_significant(&[numbers("100.00", "150.00", 0.9)]));

        let header = Disagreement::new(DisagreementType::Structure, "Header structure", "a", "b", 0.7);
        let list = Disagreement::new(DisagreementType::Structure, "List count", "1", "2", 0.6);
        assert!(!policy.is_significant(&[header.clone(), list.clone()]));

        let table = Disagreement::new(DisagreementType::Tables, "Table 1", "x", "y", 0.45);
        assert!(policy.is_significant(&[header, list, table]));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let policy = SignificancePolicy::default();
        assert!(!policy.is_significant(&[numbers("7.00", "9.00", 0.8)]));
        assert!(policy.is_significant(&[numbers("7.00", "9.00", 0.81)]));

        let table = Disagreement::new(DisagreementType::Tables, "Table count", "1", "2", 0.7);
        assert!(!policy.is_significant(&[table]));
    }

    #[test]
    fn test_magnitude_bounds() {
        let policy = magnitude_policy();
        assert!(policy.is_significant(&[numbers("$100.00", "$150.00", 0.9)]));
        // $5 difference on $1000 is within both bounds
        assert!(!policy.is_significant(&[numbers("1,000.00", "1,005.00", 0.9)]));
        // $3 on $10 exceeds the relative bound
        assert!(policy.is_significant(&[numbers("10.00", "13.00", 0.9)]));
    }

    #[test]
    fn test_magnitude_unparseable_uses_threshold() {
        let policy = magnitude_policy();
        assert!(policy.is_significant(&[numbers("$5.00, $7.00", "$5.00", 0.9)]));
        assert!(!policy.is_significant(&[numbers("12.00", "", 0.5)]));
    }
}
