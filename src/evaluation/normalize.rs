//! Text normalization applied to both sides before scoring.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

static HTML_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<table\b.*?</table>").unwrap());
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());
static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" +").unwrap());
static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static ITALIC_STAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*([^*\n]+)\*").unwrap());
static ITALIC_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_([^_\n]+)_").unwrap());
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`\n]+)`").unwrap());
static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[ \t]*[*+][ \t]+").unwrap());

static ROW_SELECTOR: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("tr").ok());
static CELL_SELECTOR: LazyLock<Option<Selector>> =
    LazyLock::new(|| Selector::parse("th, td").ok());

/// Normalize OCR output or ground truth for comparison.
///
/// Escaped newlines and tabs are expanded, HTML tables become pipe tables,
/// remaining markup is stripped, and emphasis, code and bullet styles are
/// unified. The result is lowercased with blank lines removed.
pub fn normalize_text(text: &str) -> String {
    let text = text
        .trim()
        .replace("\\n", "\n")
        .replace("\\t", "\t")
        .replace("\\r", "\r");

    let text = strip_html(&text);
    let text = SPACES.replace_all(&text, " ");
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = text.to_lowercase();

    let text = BOLD.replace_all(&text, "$1");
    let text = ITALIC_STAR.replace_all(&text, "$1");
    let text = ITALIC_UNDERSCORE.replace_all(&text, "$1");
    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = BULLET.replace_all(&text, "- ");

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_html(text: &str) -> String {
    if !text.contains('<') {
        return text.to_string();
    }

    let with_tables = HTML_TABLE.replace_all(text, |caps: &regex::Captures| {
        format!("\n{}\n", html_table_to_markdown(&caps[0]))
    });

    if !HTML_TAG.is_match(&with_tables) {
        return with_tables.into_owned();
    }
    // Parsing decodes entities as well as dropping the tags.
    let fragment = Html::parse_fragment(&with_tables);
    fragment.root_element().text().collect()
}

/// Convert one `<table>` element into pipe-table markdown.
pub fn html_table_to_markdown(html: &str) -> String {
    let (Some(rows), Some(cells)) = (ROW_SELECTOR.as_ref(), CELL_SELECTOR.as_ref()) else {
        return String::new();
    };

    let fragment = Html::parse_fragment(html);
    let rows: Vec<Vec<String>> = fragment
        .select(rows)
        .map(|row| row.select(cells).map(cell_text).collect::<Vec<_>>())
        .filter(|row| !row.is_empty())
        .collect();

    let Some(first) = rows.first() else {
        return String::new();
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(format!("| {} |", first.join(" | ")));
    lines.push(format!("|{}|", vec!["---"; first.len()].join("|")));
    for row in &rows[1..] {
        lines.push(format!("| {} |", row.join(" | ")));
    }
    lines.join("\n")
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_emphasis_and_unifies_bullets() {
        let text = "# **Invoice**\n\n* first _item_\n+ `second`\n\n\n   Total:   $5  ";
        assert_eq!(
            normalize_text(text),
            "# invoice\n- first item\n- second\ntotal: $5"
        );
    }

    #[test]
    fn test_expands_escaped_newlines() {
        assert_eq!(normalize_text("Line one\\nLine two"), "line one\nline two");
    }

    #[test]
    fn test_html_table_becomes_pipe_table() {
        let html = "<table><tr><th>Item</th><th>Price</th></tr><tr><td>Coffee</td><td>$4</td></tr></table>";
        assert_eq!(
            html_table_to_markdown(html),
            "| Item | Price |\n|---|---|\n| Coffee | $4 |"
        );

        let text = format!("Receipt<br>{}\nThanks &amp; bye", html);
        assert_eq!(
            normalize_text(&text),
            "receipt\n| item | price |\n|---|---|\n| coffee | $4 |\nthanks & bye"
        );
    }
}
