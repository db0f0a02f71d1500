//! Scoring transcriptions and extractions against ground truth.

use std::path::Path;

use console::style;
use serde::Serialize;
use serde_json::Value;

use crate::cli::icons::{arrow, success, warning};
use crate::evaluation::{
    evaluate_dataset, evaluate_json, evaluate_markdown, EvaluationReport, EvaluationSample,
    JsonScores, MarkdownScores, Summary,
};

async fn read(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let contents = read(path).await?;
    serde_json::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Invalid JSON in {}: {}", path.display(), e))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Score one predicted markdown file against its ground truth.
pub async fn cmd_evaluate_markdown(
    reference: &Path,
    prediction: &Path,
    json: bool,
) -> anyhow::Result<()> {
    let scores = evaluate_markdown(&read(reference).await?, &read(prediction).await?);
    if json {
        return print_json(&scores);
    }
    print_markdown_scores(&scores);
    Ok(())
}

/// Score one predicted JSON document against its ground truth.
pub async fn cmd_evaluate_json(
    reference: &Path,
    prediction: &Path,
    json: bool,
) -> anyhow::Result<()> {
    let reference: Value = read_json(reference).await?;
    let prediction: Value = read_json(prediction).await?;
    let scores = evaluate_json(&reference, &prediction);
    if json {
        return print_json(&scores);
    }
    print_json_scores(&scores);
    Ok(())
}

/// Score a dataset file: a JSON array of samples.
pub async fn cmd_evaluate_dataset(
    file: &Path,
    output: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let samples: Vec<EvaluationSample> = read_json(file).await?;
    if samples.is_empty() {
        anyhow::bail!("{} contains no samples", file.display());
    }
    let report = evaluate_dataset(&samples);

    if let Some(path) = output {
        tokio::fs::write(path, serde_json::to_string_pretty(&report)?).await?;
        eprintln!("{} Wrote {}", success(), path.display());
    }

    if json {
        return print_json(&report);
    }
    print_dataset(&report);
    Ok(())
}

fn print_markdown_scores(scores: &MarkdownScores) {
    println!("{}", style("Markdown").bold());
    println!("  {:<22} {:.4}", "CER", scores.cer);
    println!("  {:<22} {:.4}", "WER", scores.wer);
    println!("  {:<22} {:.4}", "Word accuracy", scores.word_accuracy);
    println!("  {:<22} {:.4}", "Table accuracy", scores.table_accuracy);
    println!(
        "  {:<22} {:.4} / {:.4} / {:.4}",
        "Rows / cols / cells", scores.row_accuracy, scores.column_accuracy, scores.cell_accuracy
    );
    println!("  {:<22} {:.4}", "Sequence similarity", scores.sequence_similarity);
}

fn print_json_scores(scores: &JsonScores) {
    println!("{}", style("JSON").bold());
    println!("  {:<22} {:.4}", "CER", scores.cer);
    println!("  {:<22} {:.4}", "JSON similarity", scores.json_similarity);
    println!("  {:<22} {:.4}", "Semantic similarity", scores.semantic_similarity);
    if !scores.field_accuracy.is_empty() {
        println!("  Fields:");
        for (path, score) in &scores.field_accuracy {
            let mark = if *score >= 1.0 { success() } else { warning() };
            println!("    {} {:<30} {:.2}", mark, path, score);
        }
    }
}

fn print_summary_header<S>(label: &str, summary: &Summary<S>) {
    println!(
        "{} {}: {}/{} successful ({:.1}%)",
        arrow(),
        label,
        summary.successful_samples,
        summary.total_samples,
        summary.success_rate * 100.0
    );
}

fn print_dataset(report: &EvaluationReport) {
    println!("Evaluated {} samples\n", report.samples.len());
    if let Some(ref summary) = report.markdown {
        print_summary_header("Markdown", summary);
        print_markdown_scores(&summary.mean);
        println!();
    }
    if let Some(ref summary) = report.json {
        print_summary_header("JSON", summary);
        print_json_scores(&summary.mean);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_dataset_file_is_scored() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("samples.json");
        let output = dir.path().join("report.json");
        let samples = json!([{
            "sample_id": "receipt-1",
            "ground_truth_markdown": "Total: $100.00",
            "markdown_prediction": "Total: $150.00",
            "ground_truth_json": {"total": 100.0},
            "json_prediction": {"total": 100.0}
        }]);
        std::fs::write(&input, samples.to_string()).unwrap();

        cmd_evaluate_dataset(&input, Some(&output), true).await.unwrap();

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written["markdown"]["successful_samples"], 1);
        assert_eq!(written["json"]["mean"]["semantic_similarity"], 1.0);
        assert!(written["markdown"]["mean"]["cer"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_empty_dataset_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("samples.json");
        std::fs::write(&input, "[]").unwrap();
        assert!(cmd_evaluate_dataset(&input, None, true).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_json_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("truth.json");
        std::fs::write(&reference, "{not json").unwrap();
        let err = cmd_evaluate_json(&reference, &reference, true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("truth.json"));
    }
}
