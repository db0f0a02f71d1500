//! Markdown feature extraction used by the detector, scorer and prompt builder.
//!
//! All functions are total: text without tables, numbers or headers simply
//! yields empty collections.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

/// Currency symbols recognized in amounts.
pub const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥'];

/// Decimal/grouped numbers take priority over bare integers so that
/// `1,234.56` is one token.
static NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+\.\d+|\d+").unwrap());

static CURRENCY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([$€£¥])\s*(\d[\d,]*(?:\.\d+)?)|(\d[\d,]*\.\d{2})\s*([$€£¥])").unwrap()
});

static NUMERIC_FIELD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(subtotal|total|amount|tax|discount)\b[^:\n\d]{0,20}:?[ \t]*[$€£¥]?[ \t]*(\d[\d.,]*\d|\d)",
    )
    .unwrap()
});

static TEXT_FIELD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(date|invoice|receipt|vendor|company|merchant)\b[^:\n|]{0,20}:[ \t]*([^\n|]+)")
        .unwrap()
});

static DATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // MM/DD/YYYY or DD/MM/YYYY
        Regex::new(r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b").unwrap(),
        // YYYY-MM-DD
        Regex::new(r"\b\d{4}[/-]\d{1,2}[/-]\d{1,2}\b").unwrap(),
        // Month DD, YYYY
        Regex::new(
            r"(?i)\b(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+\d{1,2},?\s+\d{4}\b",
        )
        .unwrap(),
    ]
});

static FENCED_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```.*?```").unwrap());
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`[^`\n]*`").unwrap());
static TABLE_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^.*\|.*$").unwrap());
static HEADER_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#+\s.*$").unwrap());
static BULLET_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*[-*+]\s").unwrap());
static NUMBERED_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*\d+[.)]\s").unwrap());
static LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?:[-*+]\s|\d+[.)]\s)").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// A numeric token and the text around it on the same line.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericToken {
    pub raw: String,
    pub value: f64,
    pub context: String,
}

/// A key:value pair for a common document field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    /// Lowercased field keyword (e.g., "total").
    pub key: String,
    pub value: String,
    /// Whether the value is an amount.
    pub numeric: bool,
    /// The full source line, for adjudication windows.
    pub line: String,
}

/// Collapse whitespace runs and trim.
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Extract every numeric token with a bounded context window.
///
/// Decimal or grouped tokens get `decimal_window` characters on each side,
/// bare integers get `bare_window`. The window never crosses a line break.
/// Tokens with no surrounding text are skipped since an empty context
/// cannot align anything.
pub fn extract_numbers_with_context(
    text: &str,
    decimal_window: usize,
    bare_window: usize,
) -> Vec<NumericToken> {
    let mut tokens = Vec::new();

    for m in NUMBER_PATTERN.find_iter(text) {
        let raw = m.as_str();
        let Some(value) = parse_amount(raw) else {
            continue;
        };

        let window = if raw.contains('.') || raw.contains(',') {
            decimal_window
        } else {
            bare_window
        };

        let line_start = text[..m.start()].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let line_end = text[m.end()..]
            .find('\n')
            .map(|i| m.end() + i)
            .unwrap_or(text.len());

        let before = tail_chars(&text[line_start..m.start()], window);
        let after = head_chars(&text[m.end()..line_end], window);
        let context = normalize_whitespace(&format!("{}{}", before, after));
        if context.is_empty() {
            continue;
        }

        tokens.push(NumericToken {
            raw: raw.to_string(),
            value,
            context,
        });
    }

    tokens
}

/// Extract currency-formatted amounts, normalized as symbol + digits.
pub fn extract_currency_amounts(text: &str) -> Vec<String> {
    CURRENCY_PATTERN
        .captures_iter(text)
        .filter_map(|caps| {
            if let (Some(symbol), Some(amount)) = (caps.get(1), caps.get(2)) {
                Some(format!("{}{}", symbol.as_str(), amount.as_str()))
            } else if let (Some(amount), Some(symbol)) = (caps.get(3), caps.get(4)) {
                Some(format!("{}{}", symbol.as_str(), amount.as_str()))
            } else {
                None
            }
        })
        .collect()
}

/// Parse an amount such as `$1,234.50` or `1234.5`.
pub fn parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| !CURRENCY_SYMBOLS.contains(c) && *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() || !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Whether two parsed amounts are the same value.
pub fn amounts_equal(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

/// Extract tables as contiguous runs of lines containing a pipe.
pub fn extract_tables(text: &str) -> Vec<String> {
    let mut tables = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.contains('|') {
            current.push(line);
        } else if !current.is_empty() {
            tables.push(current.join("\n"));
            current.clear();
        }
    }
    if !current.is_empty() {
        tables.push(current.join("\n"));
    }

    tables
}

/// Extract header lines in document order.
pub fn extract_headers(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Extract bullet/numbered lists; blank lines inside a list do not end it.
pub fn extract_lists(text: &str) -> Vec<String> {
    let mut lists = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        let stripped = line.trim();
        if LIST_ITEM.is_match(stripped) {
            current.push(stripped);
        } else if !current.is_empty() && stripped.is_empty() {
            continue;
        } else if !current.is_empty() {
            lists.push(current.join("\n"));
            current.clear();
        }
    }
    if !current.is_empty() {
        lists.push(current.join("\n"));
    }

    lists
}

/// Strip code, tables, headers and list markers for prose comparison.
pub fn clean_for_text_comparison(text: &str) -> String {
    let text = FENCED_CODE.replace_all(text, "");
    let text = INLINE_CODE.replace_all(&text, "");
    let text = TABLE_LINE.replace_all(&text, "");
    let text = HEADER_LINE.replace_all(&text, "");
    let text = BULLET_MARKER.replace_all(&text, "");
    let text = NUMBERED_MARKER.replace_all(&text, "");
    text.trim().to_string()
}

/// Extract key:value pairs for totals, amounts, dates and vendor names.
pub fn extract_fields(text: &str) -> Vec<FieldValue> {
    let mut fields = Vec::new();

    for line in text.lines() {
        for caps in NUMERIC_FIELD_PATTERN.captures_iter(line) {
            fields.push(FieldValue {
                key: caps[1].to_lowercase(),
                value: caps[2].trim().to_string(),
                numeric: true,
                line: line.trim().to_string(),
            });
        }
        for caps in TEXT_FIELD_PATTERN.captures_iter(line) {
            let value = caps[2].trim().trim_end_matches(['*', '_']).trim();
            if value.is_empty() {
                continue;
            }
            fields.push(FieldValue {
                key: caps[1].to_lowercase(),
                value: value.to_string(),
                numeric: false,
                line: line.trim().to_string(),
            });
        }
    }

    fields
}

/// Extract the set of date-looking tokens.
pub fn extract_dates(text: &str) -> BTreeSet<String> {
    let mut dates = BTreeSet::new();
    for pattern in DATE_PATTERNS.iter() {
        for m in pattern.find_iter(text) {
            dates.insert(normalize_whitespace(m.as_str()));
        }
    }
    dates
}

/// Whether any date-looking token is present.
pub fn has_date(text: &str) -> bool {
    DATE_PATTERNS.iter().any(|p| p.is_match(text))
}

/// Count numeric tokens.
pub fn count_numbers(text: &str) -> usize {
    NUMBER_PATTERN.find_iter(text).count()
}

/// String similarity ratio in [0, 1]; two empty strings are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    strsim::normalized_levenshtein(a, b)
}

/// Truncate to `max_chars` characters, appending "..." when shortened.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{}...", truncated)
}

/// Text surrounding the first occurrence of `needle`, `radius` characters
/// on each side.
pub fn context_window(text: &str, needle: &str, radius: usize) -> Option<String> {
    if needle.is_empty() {
        return None;
    }
    let start = text.find(needle)?;
    let end = start + needle.len();
    let before = tail_chars(&text[..start], radius);
    let after = head_chars(&text[end..], radius);
    Some(format!("{}{}{}", before, needle, after).trim().to_string())
}

fn head_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn tail_chars(text: &str, n: usize) -> &str {
    let count = text.chars().count();
    if count <= n {
        return text;
    }
    match text.char_indices().nth(count - n) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}
