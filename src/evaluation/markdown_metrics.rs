//! Scores for a predicted markdown transcription against ground truth.

use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use super::normalize::normalize_text;

/// Character error rate: edit distance over the reference length.
///
/// An empty reference scores 0 against an empty hypothesis and 1 otherwise.
pub fn cer(reference: &str, hypothesis: &str) -> f64 {
    let (reference, hypothesis) = (reference.trim(), hypothesis.trim());
    let len = reference.chars().count();
    if len == 0 {
        return empty_reference_rate(hypothesis.is_empty());
    }
    strsim::levenshtein(reference, hypothesis) as f64 / len as f64
}

/// Word error rate: word-level edit distance over the reference word count.
pub fn wer(reference: &str, hypothesis: &str) -> f64 {
    let reference: Vec<&str> = reference.split_whitespace().collect();
    let hypothesis: Vec<&str> = hypothesis.split_whitespace().collect();
    if reference.is_empty() {
        return empty_reference_rate(hypothesis.is_empty());
    }
    strsim::generic_levenshtein(&reference, &hypothesis) as f64 / reference.len() as f64
}

fn empty_reference_rate(hypothesis_empty: bool) -> f64 {
    if hypothesis_empty {
        0.0
    } else {
        1.0
    }
}

/// Share of reference words (with multiplicity) found in the hypothesis.
pub fn word_accuracy(reference: &str, hypothesis: &str) -> f64 {
    let reference: Vec<String> = reference.split_whitespace().map(str::to_lowercase).collect();
    let hypothesis: Vec<String> = hypothesis.split_whitespace().map(str::to_lowercase).collect();
    if reference.is_empty() {
        return 0.0;
    }
    multiset_overlap(&reference, &hypothesis) as f64 / reference.len() as f64
}

/// Normalized Levenshtein similarity of the two texts, in [0, 1].
pub fn sequence_similarity(reference: &str, hypothesis: &str) -> f64 {
    strsim::normalized_levenshtein(reference, hypothesis)
}

/// A table as rows of trimmed, non-empty cells.
pub type Table = Vec<Vec<String>>;

/// Group consecutive pipe-delimited lines into tables.
///
/// Separator rows (`|---|:--:|`) are dropped so they do not count as cells.
pub fn extract_tables(text: &str) -> Vec<Table> {
    let mut tables = Vec::new();
    let mut current: Table = Vec::new();

    for line in text.lines() {
        if !line.contains('|') {
            if !current.is_empty() {
                tables.push(std::mem::take(&mut current));
            }
            continue;
        }
        let cells: Vec<String> = line
            .split('|')
            .map(str::trim)
            .filter(|cell| !cell.is_empty())
            .map(str::to_string)
            .collect();
        if !cells.is_empty() && !cells.iter().all(|cell| is_separator_cell(cell)) {
            current.push(cells);
        }
    }
    if !current.is_empty() {
        tables.push(current);
    }
    tables
}

fn is_separator_cell(cell: &str) -> bool {
    cell.contains('-') && cell.chars().all(|c| matches!(c, '-' | ':' | ' '))
}

/// Share of reference table cells (with multiplicity) found in the hypothesis.
pub fn table_accuracy(reference: &str, hypothesis: &str) -> f64 {
    let reference: Vec<String> = extract_tables(reference).into_iter().flatten().flatten().collect();
    if reference.is_empty() {
        return 0.0;
    }
    let hypothesis: Vec<String> = extract_tables(hypothesis).into_iter().flatten().flatten().collect();
    multiset_overlap(&reference, &hypothesis) as f64 / reference.len() as f64
}

/// Row, column and cell agreement between table shapes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TableStructure {
    pub row_accuracy: f64,
    pub column_accuracy: f64,
    pub cell_accuracy: f64,
}

/// Compare table shapes.
///
/// A reference table's rows count when some hypothesis table has the same
/// number of rows, and its columns count when some hypothesis table has the
/// same header width. Cells count per row for every equally tall hypothesis
/// table whose row has the same width.
pub fn table_structure_accuracy(reference: &str, hypothesis: &str) -> TableStructure {
    let reference = extract_tables(reference);
    let hypothesis = extract_tables(hypothesis);
    if reference.is_empty() {
        return TableStructure::default();
    }

    let width = |table: &Table| table.first().map_or(0, Vec::len);

    let mut total_rows = 0;
    let mut total_columns = 0;
    let mut total_cells = 0;
    let mut matched_rows = 0;
    let mut matched_columns = 0;
    let mut matched_cells = 0;

    for table in &reference {
        total_rows += table.len();
        total_columns += width(table);
        total_cells += table.len() * width(table);

        if hypothesis.iter().any(|other| other.len() == table.len()) {
            matched_rows += table.len();
        }
        if hypothesis.iter().any(|other| width(other) == width(table)) {
            matched_columns += width(table);
        }
        for other in hypothesis.iter().filter(|other| other.len() == table.len()) {
            matched_cells += table
                .iter()
                .zip(other)
                .filter(|(a, b)| a.len() == b.len())
                .map(|(a, _)| a.len())
                .sum::<usize>();
        }
    }

    TableStructure {
        row_accuracy: ratio(matched_rows, total_rows),
        column_accuracy: ratio(matched_columns, total_columns),
        cell_accuracy: ratio(matched_cells, total_cells),
    }
}

fn ratio(matched: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        matched as f64 / total as f64
    }
}

/// Size of the multiset intersection of two sequences.
pub(crate) fn multiset_overlap<T: Eq + Hash>(reference: &[T], hypothesis: &[T]) -> usize {
    let mut counts: HashMap<&T, usize> = HashMap::new();
    for item in hypothesis {
        *counts.entry(item).or_default() += 1;
    }
    reference
        .iter()
        .filter(|item| match counts.get_mut(item) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        })
        .count()
}

/// All markdown scores for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkdownScores {
    pub cer: f64,
    pub wer: f64,
    pub word_accuracy: f64,
    pub table_accuracy: f64,
    pub row_accuracy: f64,
    pub column_accuracy: f64,
    pub cell_accuracy: f64,
    pub sequence_similarity: f64,
}

impl MarkdownScores {
    /// Scores recorded for a sample whose extraction failed.
    pub fn failed() -> Self {
        Self {
            cer: 1.0,
            wer: 1.0,
            word_accuracy: 0.0,
            table_accuracy: 0.0,
            row_accuracy: 0.0,
            column_accuracy: 0.0,
            cell_accuracy: 0.0,
            sequence_similarity: 0.0,
        }
    }

    /// Field-wise mean, or the failed scores when `scores` is empty.
    pub fn mean(scores: &[MarkdownScores]) -> Self {
        if scores.is_empty() {
            return Self::failed();
        }
        let n = scores.len() as f64;
        let avg = |f: fn(&MarkdownScores) -> f64| scores.iter().map(f).sum::<f64>() / n;
        Self {
            cer: avg(|s| s.cer),
            wer: avg(|s| s.wer),
            word_accuracy: avg(|s| s.word_accuracy),
            table_accuracy: avg(|s| s.table_accuracy),
            row_accuracy: avg(|s| s.row_accuracy),
            column_accuracy: avg(|s| s.column_accuracy),
            cell_accuracy: avg(|s| s.cell_accuracy),
            sequence_similarity: avg(|s| s.sequence_similarity),
        }
    }
}

/// Normalize both texts and compute every markdown score.
pub fn evaluate_markdown(reference: &str, hypothesis: &str) -> MarkdownScores {
    let reference = normalize_text(reference);
    let hypothesis = normalize_text(hypothesis);
    let structure = table_structure_accuracy(&reference, &hypothesis);

    MarkdownScores {
        cer: cer(&reference, &hypothesis),
        wer: wer(&reference, &hypothesis),
        word_accuracy: word_accuracy(&reference, &hypothesis),
        table_accuracy: table_accuracy(&reference, &hypothesis),
        row_accuracy: structure.row_accuracy,
        column_accuracy: structure.column_accuracy,
        cell_accuracy: structure.cell_accuracy,
        sequence_similarity: sequence_similarity(&reference, &hypothesis),
    }
}
