//! Run the ensemble on a single document.

use std::path::Path;
use std::sync::Arc;

use console::style;
use serde_json::Value;

use crate::acquire::load_page_image;
use crate::cli::icons::{arrow, error, success, warning};
use crate::config::Config;
use crate::diagnostics::TracingSink;
use crate::ensemble::EnsembleReport;

/// Process an image or PDF and print the report.
pub async fn cmd_process(
    config: &Config,
    file: &Path,
    schema: Option<&Path>,
    output: Option<&Path>,
    compact: bool,
) -> anyhow::Result<()> {
    if !file.exists() {
        anyhow::bail!("File not found: {}", file.display());
    }

    let schema = load_schema(schema)?;
    let page = load_page_image(file)?;
    if page.from_pdf {
        eprintln!("{} Rendered first PDF page to PNG", arrow());
    }

    let orchestrator = config.build_orchestrator(Arc::new(TracingSink));
    eprintln!(
        "{} Running {} + {}",
        arrow(),
        style(orchestrator.primary().name()).bold(),
        style(orchestrator.secondary().name()).bold()
    );

    let report = orchestrator.process(&page.bytes, &schema).await;
    print_summary(&report);

    let rendered = if compact {
        serde_json::to_string(&report)?
    } else {
        serde_json::to_string_pretty(&report)?
    };

    match output {
        Some(path) => {
            std::fs::write(path, rendered)?;
            eprintln!("{} Report written to {}", success(), path.display());
        }
        None => println!("{}", rendered),
    }

    if report.is_success() {
        Ok(())
    } else {
        anyhow::bail!(report.error.unwrap_or_else(|| "Ensemble failed".to_string()))
    }
}

/// Read a JSON schema file, or use an empty object schema.
fn load_schema(path: Option<&Path>) -> anyhow::Result<Value> {
    match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("Failed to read schema {}: {}", path.display(), e))?;
            Ok(serde_json::from_str(&contents)?)
        }
        None => Ok(serde_json::json!({ "type": "object", "properties": {} })),
    }
}

fn print_summary(report: &EnsembleReport) {
    if !report.is_success() {
        eprintln!(
            "{} {}",
            error(),
            report.error.as_deref().unwrap_or("Ensemble failed")
        );
        return;
    }

    let results = &report.ensemble_results;
    let method = results
        .resolution_method
        .map(|m| m.as_str())
        .unwrap_or("none");
    eprintln!(
        "{} Resolved by {} ({} disagreements{})",
        success(),
        style(method).cyan(),
        results.disagreement_count,
        if results.has_significant_disagreements {
            ", significant"
        } else {
            ""
        }
    );
    eprintln!(
        "  {} Confidence: {:.2}",
        style("→").dim(),
        results.ensemble_confidence
    );
    if let Some(ref err) = results.adjudication_error {
        eprintln!("  {} Adjudication failed: {}", warning(), err);
    }
    if report.ensemble_fallback {
        eprintln!(
            "  {} Used fallback {}",
            warning(),
            report.providers_used.fallback.as_deref().unwrap_or("provider")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_schema_is_empty_object() {
        let schema = load_schema(None).unwrap();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_schema_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("schema.json");
        std::fs::write(&path, r#"{"properties": {"total": {"type": "number"}}}"#).unwrap();
        let schema = load_schema(Some(&path)).unwrap();
        assert_eq!(schema["properties"]["total"]["type"], "number");

        assert!(load_schema(Some(&temp.path().join("missing.json"))).is_err());
    }
}
