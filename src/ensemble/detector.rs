//! Disagreement detection between two candidate markdown documents.

use std::collections::{HashMap, HashSet};

use super::disagreement::{Disagreement, DisagreementType};
use super::markdown::{self, FieldValue};
use super::settings::{DetectorSettings, NumericMode};

/// Compares two markdown documents and reports where they differ.
///
/// Detection never fails: text without numbers, tables or headers simply
/// produces fewer disagreements. Comparing a document with itself always
/// yields an empty list.
#[derive(Debug, Clone, Default)]
pub struct DisagreementDetector {
    settings: DetectorSettings,
}

impl DisagreementDetector {
    pub fn new(settings: DetectorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    /// Detect disagreements between `a` (primary) and `b` (secondary), in
    /// detection order: numbers, tables, text, structure, fields, dates.
    pub fn detect(&self, a: &str, b: &str) -> Vec<Disagreement> {
        let mut found = Vec::new();

        match self.settings.numeric_mode {
            NumericMode::Contextual => self.compare_numbers(a, b, &mut found),
            NumericMode::CurrencyOnly => self.compare_currency(a, b, &mut found),
        }
        self.compare_tables(a, b, &mut found);
        self.compare_text(a, b, &mut found);
        self.compare_structure(a, b, &mut found);
        if self.settings.field_level {
            self.compare_fields(a, b, &mut found);
        }
        if self.settings.date_comparison {
            self.compare_dates(a, b, &mut found);
        }

        found
    }

    /// Numbers sharing a context window but differing in value.
    fn compare_numbers(&self, a: &str, b: &str, found: &mut Vec<Disagreement>) {
        let tokens_a = markdown::extract_numbers_with_context(
            a,
            self.settings.decimal_context_chars,
            self.settings.integer_context_chars,
        );
        let tokens_b = markdown::extract_numbers_with_context(
            b,
            self.settings.decimal_context_chars,
            self.settings.integer_context_chars,
        );

        let mut reported: HashSet<(String, String, String)> = HashSet::new();
        for token in &tokens_a {
            let aligned: Vec<_> = tokens_b
                .iter()
                .filter(|other| other.context == token.context)
                .collect();
            if aligned.is_empty()
                || aligned
                    .iter()
                    .any(|other| markdown::amounts_equal(other.value, token.value))
            {
                continue;
            }

            let other = aligned[0];
            let key = (token.context.clone(), token.raw.clone(), other.raw.clone());
            if reported.insert(key) {
                found.push(Disagreement::new(
                    DisagreementType::Numbers,
                    token.context.clone(),
                    token.raw.clone(),
                    other.raw.clone(),
                    self.settings.number_confidence,
                ));
            }
        }
    }

    /// Currency amounts compared by count, then by ordinal position.
    fn compare_currency(&self, a: &str, b: &str, found: &mut Vec<Disagreement>) {
        let amounts_a = markdown::extract_currency_amounts(a);
        let amounts_b = markdown::extract_currency_amounts(b);

        if amounts_a.len() != amounts_b.len() {
            found.push(Disagreement::new(
                DisagreementType::Numbers,
                "Currency amounts",
                amounts_a.join(", "),
                amounts_b.join(", "),
                self.settings.currency_count_confidence,
            ));
            return;
        }

        for (i, (x, y)) in amounts_a.iter().zip(amounts_b.iter()).enumerate() {
            let same = match (markdown::parse_amount(x), markdown::parse_amount(y)) {
                (Some(vx), Some(vy)) => markdown::amounts_equal(vx, vy),
                _ => x == y,
            };
            if !same {
                found.push(Disagreement::new(
                    DisagreementType::Numbers,
                    format!("Amount {}", i + 1),
                    x.clone(),
                    y.clone(),
                    self.settings.currency_value_confidence,
                ));
            }
        }
    }

    fn compare_tables(&self, a: &str, b: &str, found: &mut Vec<Disagreement>) {
        let tables_a = markdown::extract_tables(a);
        let tables_b = markdown::extract_tables(b);

        if tables_a.len() != tables_b.len() {
            found.push(Disagreement::new(
                DisagreementType::Tables,
                "Table count",
                format!("{} tables", tables_a.len()),
                format!("{} tables", tables_b.len()),
                self.settings.table_count_confidence,
            ));
        }

        for (i, (x, y)) in tables_a.iter().zip(tables_b.iter()).enumerate() {
            if x == y {
                continue;
            }
            let similarity = markdown::similarity(x, y);
            if similarity < self.settings.table_similarity_threshold {
                found.push(Disagreement::new(
                    DisagreementType::Tables,
                    format!("Table {}", i + 1),
                    markdown::truncate_chars(x, self.settings.snippet_chars),
                    markdown::truncate_chars(y, self.settings.snippet_chars),
                    1.0 - similarity,
                ));
            }
        }
    }

    fn compare_text(&self, a: &str, b: &str, found: &mut Vec<Disagreement>) {
        let clean_a = markdown::clean_for_text_comparison(a);
        let clean_b = markdown::clean_for_text_comparison(b);

        let similarity = markdown::similarity(&clean_a, &clean_b);
        if similarity < self.settings.text_similarity_threshold {
            found.push(Disagreement::new(
                DisagreementType::TextContent,
                "Overall content",
                format!("Length: {} chars", clean_a.chars().count()),
                format!("Length: {} chars", clean_b.chars().count()),
                1.0 - similarity,
            ));
        }
    }

    fn compare_structure(&self, a: &str, b: &str, found: &mut Vec<Disagreement>) {
        let headers_a = markdown::extract_headers(a);
        let headers_b = markdown::extract_headers(b);
        if headers_a != headers_b {
            found.push(Disagreement::new(
                DisagreementType::Structure,
                "Header structure",
                markdown::truncate_chars(&headers_a.join(" / "), self.settings.snippet_chars),
                markdown::truncate_chars(&headers_b.join(" / "), self.settings.snippet_chars),
                self.settings.header_confidence,
            ));
        }

        let lists_a = markdown::extract_lists(a);
        let lists_b = markdown::extract_lists(b);
        if lists_a.len() != lists_b.len() {
            found.push(Disagreement::new(
                DisagreementType::Structure,
                "List count",
                format!("{} lists", lists_a.len()),
                format!("{} lists", lists_b.len()),
                self.settings.list_confidence,
            ));
        }
    }

    /// Key:value fields paired by key and occurrence order.
    fn compare_fields(&self, a: &str, b: &str, found: &mut Vec<Disagreement>) {
        let fields_a = index_fields(markdown::extract_fields(a));
        let fields_b = index_fields(markdown::extract_fields(b));
        let lookup_b: HashMap<(&str, usize), &FieldValue> = fields_b
            .iter()
            .map(|(ord, f)| ((f.key.as_str(), *ord), f))
            .collect();
        let lookup_a: HashMap<(&str, usize), &FieldValue> = fields_a
            .iter()
            .map(|(ord, f)| ((f.key.as_str(), *ord), f))
            .collect();

        for (ord, field) in &fields_a {
            match lookup_b.get(&(field.key.as_str(), *ord)) {
                Some(other) if field_values_match(field, other) => {}
                Some(other) => found.push(Disagreement::new(
                    field_type(field),
                    format!("Field: {}", field.key),
                    field.value.clone(),
                    other.value.clone(),
                    self.settings.field_mismatch_confidence,
                )),
                None => found.push(Disagreement::new(
                    field_type(field),
                    format!("Missing field: {}", field.key),
                    field.value.clone(),
                    "",
                    self.settings.field_missing_confidence,
                )),
            }
        }

        for (ord, field) in &fields_b {
            if !lookup_a.contains_key(&(field.key.as_str(), *ord)) {
                found.push(Disagreement::new(
                    field_type(field),
                    format!("Missing field: {}", field.key),
                    "",
                    field.value.clone(),
                    self.settings.field_missing_confidence,
                ));
            }
        }
    }

    fn compare_dates(&self, a: &str, b: &str, found: &mut Vec<Disagreement>) {
        let dates_a = markdown::extract_dates(a);
        let dates_b = markdown::extract_dates(b);
        if dates_a != dates_b {
            found.push(Disagreement::new(
                DisagreementType::TextContent,
                "Date values",
                dates_a.into_iter().collect::<Vec<_>>().join(", "),
                dates_b.into_iter().collect::<Vec<_>>().join(", "),
                self.settings.date_confidence,
            ));
        }
    }
}

/// Attach the per-key occurrence ordinal to each field.
fn index_fields(fields: Vec<FieldValue>) -> Vec<(usize, FieldValue)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    fields
        .into_iter()
        .map(|field| {
            let ord = counts.entry(field.key.clone()).or_insert(0);
            let current = *ord;
            *ord += 1;
            (current, field)
        })
        .collect()
}

fn field_values_match(a: &FieldValue, b: &FieldValue) -> bool {
    if a.numeric {
        if let (Some(x), Some(y)) = (
            markdown::parse_amount(&a.value),
            markdown::parse_amount(&b.value),
        ) {
            return markdown::amounts_equal(x, y);
        }
    }
    markdown::normalize_whitespace(&a.value).to_lowercase()
        == markdown::normalize_whitespace(&b.value).to_lowercase()
}

fn field_type(field: &FieldValue) -> DisagreementType {
    if field.numeric {
        DisagreementType::Numbers
    } else {
        DisagreementType::TextContent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> DisagreementDetector {
        DisagreementDetector::default()
    }

    #[test]
    fn test_identical_documents_have_no_disagreements() {
        let doc = "# Report\n- item A\n- item B";
        assert!(detector().detect(doc, doc).is_empty());
    }

    #[test]
    fn test_self_comparison_with_rich_document() {
        let doc = "# Invoice\nVendor: ACME\nDate: 2024-01-15\n\n| Item | Qty | Price |\n|---|---|---|\n| Widget | 2 | $3.50 |\n\nTotal: $7.00\n- paid\n- shipped";
        let owned = doc.to_string();
        assert!(detector().detect(doc, &owned).is_empty());
    }

    #[test]
    fn test_total_mismatch_reports_number_at_context() {
        let found = detector().detect("Total: $100.00", "Total: $150.00");
        let number = found
            .iter()
            .find(|d| d.kind == DisagreementType::Numbers && d.location == "Total: $")
            .expect("numeric disagreement");
        assert_eq!(number.content_a, "100.00");
        assert_eq!(number.content_b, "150.00");
        assert!(number.confidence >= 0.8);
        assert!(found.iter().any(|d| d.location == "Field: total"));
    }

    #[test]
    fn test_formatting_only_difference_is_not_numeric() {
        let found = detector().detect("Total: 1,000.00 USD", "Total: 1000.00 USD");
        assert!(found.iter().all(|d| d.kind != DisagreementType::Numbers));
    }

    #[test]
    fn test_currency_only_mode() {
        let settings = DetectorSettings {
            numeric_mode: NumericMode::CurrencyOnly,
            field_level: false,
            ..Default::default()
        };
        let detector = DisagreementDetector::new(settings);

        let found = detector.detect("Paid $5.00 and $7.00", "Paid $5.00 and $9.00");
        let amounts: Vec<_> = found
            .iter()
            .filter(|d| d.kind == DisagreementType::Numbers)
            .collect();
        assert_eq!(amounts.len(), 1);
        assert_eq!(amounts[0].location, "Amount 2");
        assert_eq!(amounts[0].confidence, 0.85);

        let found = detector.detect("Paid $5.00", "Paid $5.00 and $9.00");
        assert_eq!(found[0].location, "Currency amounts");
        assert_eq!(found[0].confidence, 0.9);
    }

    #[test]
    fn test_table_count_mismatch() {
        let a = "| a | b |\n|---|---|\n| 1 | 2 |";
        let b = "No table here at all";
        let found = detector().detect(a, b);
        let table = found
            .iter()
            .find(|d| d.location == "Table count")
            .expect("table count");
        assert_eq!(table.kind, DisagreementType::Tables);
        assert_eq!(table.confidence, 0.8);
    }

    #[test]
    fn test_dissimilar_tables_scored_by_similarity() {
        let a = "| Name | City |\n|---|---|\n| Alice | Paris |";
        let b = "| Qty | Price |\n|---|---|\n| 9 | 14 |";
        let found = detector().detect(a, b);
        let table = found
            .iter()
            .find(|d| d.location == "Table 1")
            .expect("table disagreement");
        assert!(table.confidence > 0.15 && table.confidence <= 1.0);
    }

    #[test]
    fn test_text_content_difference() {
        let a = "The quick brown fox jumps over the lazy dog near the river bank.";
        let b = "Completely unrelated words appear in this second sentence instead.";
        let found = detector().detect(a, b);
        let text = found
            .iter()
            .find(|d| d.kind == DisagreementType::TextContent)
            .expect("text disagreement");
        assert_eq!(text.location, "Overall content");
        assert!(text.content_a.starts_with("Length: "));
    }

    #[test]
    fn test_structure_differences() {
        let a = "# Report\n## Details\nSame body text here\n- one\n- two";
        let b = "# Report\nSame body text here\n- one\n- two";
        let found = detector().detect(a, b);
        let header = found
            .iter()
            .find(|d| d.location == "Header structure")
            .expect("header disagreement");
        assert_eq!(header.kind, DisagreementType::Structure);
        assert_eq!(header.confidence, 0.7);
        assert!(found.iter().all(|d| d.location != "List count"));
    }

    #[test]
    fn test_missing_field_both_directions() {
        let a = "Vendor: ACME Corp\nNotes: none";
        let b = "Notes: none\nTotal: 12.00";
        let found = detector().detect(a, b);
        let missing: Vec<_> = found
            .iter()
            .filter(|d| d.location.starts_with("Missing field"))
            .collect();
        assert_eq!(missing.len(), 2);
        assert_eq!(missing[0].location, "Missing field: vendor");
        assert_eq!(missing[0].kind, DisagreementType::TextContent);
        assert_eq!(missing[1].location, "Missing field: total");
        assert_eq!(missing[1].content_a, "");
        assert_eq!(missing[1].confidence, 0.85);
    }

    #[test]
    fn test_date_sets_compared() {
        let found = detector().detect(
            "Issued on 01/15/2024 by clerk",
            "Issued on 01/16/2024 by clerk",
        );
        assert!(found
            .iter()
            .any(|d| d.location == "Date values" && d.confidence == 0.85));
    }

    #[test]
    fn test_optional_checks_can_be_disabled() {
        let settings = DetectorSettings {
            field_level: false,
            date_comparison: false,
            ..Default::default()
        };
        let found = DisagreementDetector::new(settings).detect(
            "Vendor: ACME on 01/15/2024",
            "Vendor: ACNE on 01/16/2024",
        );
        assert!(found
            .iter()
            .all(|d| !d.location.starts_with("Field") && d.location != "Date values"));
    }
}
