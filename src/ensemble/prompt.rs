//! Adjudication instructions built from two candidates and their conflicts.

use super::disagreement::Disagreement;
use super::markdown;
use super::settings::AdjudicationSettings;

const ADJUDICATION_HEADER: &str = "Two OCR models transcribed the attached document image and \
disagree in places. Re-examine the IMAGE itself and produce the single correct markdown \
transcription. Use the candidates below only as hints; when they conflict, trust what the \
image shows. Preserve tables, headers, lists and every number exactly.";

const OUTPUT_FOOTER: &str = "Return only the corrected markdown, with no commentary.";

/// Which prompt shape was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStrategy {
    /// Both full candidates plus a conflict digest.
    Full,
    /// Only the text windows around the top conflicts.
    Focused,
}

/// Builds adjudicator instructions.
#[derive(Debug, Clone, Default)]
pub struct AdjudicationPromptBuilder {
    settings: AdjudicationSettings,
}

impl AdjudicationPromptBuilder {
    pub fn new(settings: AdjudicationSettings) -> Self {
        Self { settings }
    }

    pub fn strategy_for(&self, primary: &str, secondary: &str) -> PromptStrategy {
        let total = primary.chars().count() + secondary.chars().count();
        if total <= self.settings.full_prompt_max_chars {
            PromptStrategy::Full
        } else {
            PromptStrategy::Focused
        }
    }

    pub fn build(&self, primary: &str, secondary: &str, disagreements: &[Disagreement]) -> String {
        match self.strategy_for(primary, secondary) {
            PromptStrategy::Full => self.build_full(primary, secondary, disagreements),
            PromptStrategy::Focused => self.build_focused(primary, secondary, disagreements),
        }
    }

    fn build_full(&self, primary: &str, secondary: &str, disagreements: &[Disagreement]) -> String {
        let mut prompt = String::from(ADJUDICATION_HEADER);
        prompt.push_str("\n\nDetected disagreements:\n");
        prompt.push_str(&digest(disagreements));
        prompt.push_str("\n\n=== CANDIDATE A ===\n");
        prompt.push_str(primary);
        prompt.push_str("\n\n=== CANDIDATE B ===\n");
        prompt.push_str(secondary);
        prompt.push_str("\n\n");
        prompt.push_str(OUTPUT_FOOTER);
        prompt
    }

    fn build_focused(
        &self,
        primary: &str,
        secondary: &str,
        disagreements: &[Disagreement],
    ) -> String {
        let mut ranked: Vec<&Disagreement> = disagreements.iter().collect();
        ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        ranked.truncate(self.settings.focused_max_conflicts);

        let mut prompt = String::from(ADJUDICATION_HEADER);
        prompt.push_str(&format!(
            "\n\nThe candidates are long; only the {} most important conflicts are shown. \
             Transcribe the whole document from the image.\n",
            ranked.len()
        ));

        for (i, d) in ranked.iter().enumerate() {
            let window_a = self.window(primary, &d.content_a);
            let window_b = self.window(secondary, &d.content_b);
            prompt.push_str(&format!(
                "\nConflict {} ({} at {}, confidence {:.2}):\n  A: {}\n  B: {}\n",
                i + 1,
                d.kind,
                d.location,
                d.confidence,
                window_a,
                window_b
            ));
        }

        prompt.push('\n');
        prompt.push_str(OUTPUT_FOOTER);
        prompt
    }

    /// Surrounding text for a conflicting value, or the value itself when it
    /// does not occur verbatim.
    fn window(&self, document: &str, content: &str) -> String {
        let window = markdown::context_window(document, content, self.settings.window_chars)
            .unwrap_or_else(|| content.to_string());
        let window = markdown::normalize_whitespace(&window);
        if window.is_empty() {
            "(absent)".to_string()
        } else {
            window
        }
    }
}

/// Human-readable list of disagreements.
pub fn digest(disagreements: &[Disagreement]) -> String {
    if disagreements.is_empty() {
        return "- none".to_string();
    }
    disagreements
        .iter()
        .map(|d| format!("- {}", d.summary()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::disagreement::DisagreementType;

    fn conflict(a: &str, b: &str, confidence: f64) -> Disagreement {
        Disagreement::new(DisagreementType::Numbers, "Total: $", a, b, confidence)
    }

    #[test]
    fn test_short_candidates_use_full_prompt() {
        let builder = AdjudicationPromptBuilder::default();
        let prompt = builder.build(
            "Total: $100.00",
            "Total: $150.00",
            &[conflict("100.00", "150.00", 0.9)],
        );
        assert_eq!(
            builder.strategy_for("Total: $100.00", "Total: $150.00"),
            PromptStrategy::Full
        );
        assert!(prompt.contains("=== CANDIDATE A ===\nTotal: $100.00"));
        assert!(prompt.contains("=== CANDIDATE B ===\nTotal: $150.00"));
        assert!(prompt.contains("NUMBERS at Total: $"));
        assert!(prompt.contains("IMAGE"));
    }

    #[test]
    fn test_long_candidates_use_focused_windows() {
        let builder = AdjudicationPromptBuilder::new(AdjudicationSettings {
            full_prompt_max_chars: 50,
            focused_max_conflicts: 2,
            window_chars: 10,
        });
        let filler = "lorem ipsum ".repeat(100);
        let primary = format!("{}Total: $100.00 due{}", filler, filler);
        let secondary = format!("{}Total: $150.00 due{}", filler, filler);
        let conflicts = vec![
            conflict("1", "2", 0.3),
            conflict("100.00", "150.00", 0.95),
            conflict("x", "y", 0.5),
        ];

        let prompt = builder.build(&primary, &secondary, &conflicts);
        assert!(!prompt.contains("CANDIDATE A"));
        assert!(prompt.contains("Conflict 1 (numbers at Total: $, confidence 0.95)"));
        assert!(prompt.contains("Conflict 2"));
        assert!(!prompt.contains("Conflict 3"));
        assert!(prompt.contains("Total: $100.00 due"));
        assert!(prompt.len() < primary.len() + secondary.len());
    }

    #[test]
    fn test_missing_content_marked_absent() {
        let builder = AdjudicationPromptBuilder::default();
        assert_eq!(builder.window("text", ""), "(absent)");
        assert_eq!(builder.window("text", "zzz"), "zzz");
    }

    #[test]
    fn test_empty_digest() {
        assert_eq!(digest(&[]), "- none");
    }
}
