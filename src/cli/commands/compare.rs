//! Offline comparison of two transcriptions.

use std::path::Path;

use console::style;
use serde::Serialize;

use crate::cli::icons::{success, warning};
use crate::config::Config;
use crate::ensemble::{
    Disagreement, DisagreementDetector, Provenance, QualityScorer, SignificancePolicy,
};

#[derive(Debug, Serialize)]
struct CompareReport {
    disagreements: Vec<Disagreement>,
    significant: bool,
    primary_score: f64,
    secondary_score: f64,
    selected: Provenance,
}

/// Run detection, significance and selection over two markdown files.
pub async fn cmd_compare(config: &Config, a: &Path, b: &Path, json: bool) -> anyhow::Result<()> {
    let primary = tokio::fs::read_to_string(a)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", a.display(), e))?;
    let secondary = tokio::fs::read_to_string(b)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", b.display(), e))?;

    let report = compare_texts(config, primary.trim(), secondary.trim());

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.disagreements.is_empty() {
        println!("{} No disagreements", success());
    } else {
        println!(
            "{} {} disagreements ({})",
            if report.significant { warning() } else { success() },
            report.disagreements.len(),
            if report.significant {
                "significant"
            } else {
                "not significant"
            }
        );
        for d in &report.disagreements {
            println!(
                "  {} {:<14} {:.2}  {}",
                style("→").dim(),
                d.kind.as_str(),
                d.confidence,
                d.location
            );
            println!("      {}", style(format!("A: {}", d.content_a)).dim());
            println!("      {}", style(format!("B: {}", d.content_b)).dim());
        }
    }

    println!(
        "\nQuality: A {:.2}, B {:.2} -> {}",
        report.primary_score,
        report.secondary_score,
        style(report.selected.as_str()).cyan()
    );

    Ok(())
}

fn compare_texts(config: &Config, primary: &str, secondary: &str) -> CompareReport {
    let settings = &config.ensemble;
    let detector = DisagreementDetector::new(settings.detector.clone());
    let policy = SignificancePolicy::new(settings.significance.clone());
    let scorer = QualityScorer::new(settings.selection.clone());

    let disagreements = detector.detect(primary, secondary);
    let significant = policy.is_significant(&disagreements);

    CompareReport {
        significant,
        primary_score: scorer.score(primary),
        secondary_score: scorer.score(secondary),
        selected: scorer.select(primary, secondary),
        disagreements,
    }
}
