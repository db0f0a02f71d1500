//! Heuristic selection between two candidate documents.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::markdown;
use super::report::Provenance;
use super::settings::{QualityWeights, SelectionPolicy, SelectionSettings};

static KEY_VALUE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*[^:\n|]{1,40}:\s*\S").unwrap());

const DOMAIN_KEYWORDS: &[&str] = &["total", "date", "amount", "invoice", "receipt"];
const PLACEHOLDER_CHARS: &[char] = &['\u{FFFD}', '?', '□'];

/// Scores candidates and picks one without calling a model.
#[derive(Debug, Clone, Default)]
pub struct QualityScorer {
    settings: SelectionSettings,
}

impl QualityScorer {
    pub fn new(settings: SelectionSettings) -> Self {
        Self { settings }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.settings.policy
    }

    /// Quality score of one candidate; higher is better.
    pub fn score(&self, text: &str) -> f64 {
        let w: &QualityWeights = &self.settings.weights;
        let text = text.trim();
        if text.is_empty() {
            return 0.0;
        }

        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let char_count = text.chars().count();
        let mut score = 0.0;

        // Table structure
        let table_rows: Vec<&str> = lines
            .iter()
            .copied()
            .filter(|l| l.trim_start().starts_with('|'))
            .collect();
        if table_rows.len() >= 2 {
            score += w.table_bonus;
            let first = table_rows[0].matches('|').count();
            if table_rows.iter().all(|row| row.matches('|').count() == first) {
                score += w.table_consistency_bonus;
            }
            if table_rows.iter().any(|row| is_separator_row(row)) {
                score += w.separator_bonus;
            }
        }

        let numbers = markdown::count_numbers(text);
        score += (numbers as f64 * w.per_number).min(w.numeric_cap);

        if text.contains('%') || text.contains(markdown::CURRENCY_SYMBOLS) {
            score += w.symbol_bonus;
        }

        score += (lines.len() as f64 * w.per_line).min(w.line_cap);

        if KEY_VALUE_LINE.is_match(text) {
            score += w.key_value_bonus;
        }

        let lower = text.to_lowercase();
        let keywords = DOMAIN_KEYWORDS
            .iter()
            .filter(|k| lower.contains(*k))
            .count();
        score += keywords as f64 * w.keyword_bonus;

        if markdown::has_date(text) {
            score += w.date_bonus;
        }

        score += (w.length_weight * (1.0 + char_count as f64 / 100.0).ln()).min(w.length_cap);

        // Penalties
        if lines.len() <= 2 && char_count > 300 {
            score -= w.long_line_penalty;
        }

        let distinct: HashSet<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
        if char_count >= 50 && distinct.len() < 10 {
            score -= w.low_diversity_penalty;
        }

        let placeholders = text.chars().filter(|c| PLACEHOLDER_CHARS.contains(c)).count();
        if placeholders as f64 / char_count as f64 > w.placeholder_ratio {
            score -= w.placeholder_penalty;
        }

        score
    }

    /// Pick the better of two candidates, returning its provenance.
    ///
    /// Ties go to the candidate with more numeric tokens, then to primary.
    pub fn select(&self, primary: &str, secondary: &str) -> Provenance {
        match self.settings.policy {
            SelectionPolicy::Length => {
                if secondary.trim().chars().count() > primary.trim().chars().count() {
                    Provenance::Secondary
                } else {
                    Provenance::Primary
                }
            }
            SelectionPolicy::Quality => {
                let score_a = self.score(primary);
                let score_b = self.score(secondary);
                if (score_a - score_b).abs() < self.settings.tie_epsilon {
                    if markdown::count_numbers(secondary) > markdown::count_numbers(primary) {
                        Provenance::Secondary
                    } else {
                        Provenance::Primary
                    }
                } else if score_b > score_a {
                    Provenance::Secondary
                } else {
                    Provenance::Primary
                }
            }
        }
    }
}

fn is_separator_row(row: &str) -> bool {
    let inner = row.trim().trim_matches('|');
    !inner.is_empty()
        && inner.contains('-')
        && inner
            .chars()
            .all(|c| matches!(c, '-' | ':' | '|' | ' '))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_beats_flat() {
        let scorer = QualityScorer::default();
        let table = "# Invoice\n| Item | Price |\n|---|---|\n| Widget | $3.50 |\nTotal: $3.50\nDate: 2024-01-15";
        let flat = "Invoice Widget 3.50";
        assert!(scorer.score(table) > scorer.score(flat));
        assert_eq!(scorer.select(flat, table), Provenance::Secondary);
    }

    #[test]
    fn test_penalties() {
        let scorer = QualityScorer::default();
        let segmented = "word ".repeat(80).trim().replace(' ', "\n");
        let one_line = "word ".repeat(80);
        assert!(scorer.score(&segmented) > scorer.score(&one_line));

        let placeholders = "a?b?c?d?e? unreadable ??? text".to_string();
        let clean = "abcde readable plain text here".to_string();
        assert!(scorer.score(&clean) > scorer.score(&placeholders));
    }

    #[test]
    fn test_tie_prefers_primary() {
        let scorer = QualityScorer::default();
        assert_eq!(scorer.select("same text", "same text"), Provenance::Primary);
        assert_eq!(scorer.select("", ""), Provenance::Primary);
    }

    #[test]
    fn test_length_policy() {
        let scorer = QualityScorer::new(SelectionSettings {
            policy: SelectionPolicy::Length,
            ..Default::default()
        });
        assert_eq!(scorer.select("short", "much longer"), Provenance::Secondary);
        assert_eq!(scorer.select("equal", "same!"), Provenance::Primary);
    }

    #[test]
    fn test_separator_detection() {
        assert!(is_separator_row("|---|:---:|"));
        assert!(!is_separator_row("| a | b |"));
        assert!(!is_separator_row("||"));
    }
}
