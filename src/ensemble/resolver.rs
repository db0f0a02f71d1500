//! Produces one final document from two successful candidates.

use std::time::Duration;

use tracing::{debug, warn};

use super::disagreement::Disagreement;
use super::prompt::AdjudicationPromptBuilder;
use super::quality::QualityScorer;
use super::report::{MarkdownDocument, Provenance, ResolutionMethod};
use super::settings::EnsembleSettings;
use crate::providers::{guarded_extract, OcrProvider, ProviderError};

/// Outcome of resolving two candidates.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub document: MarkdownDocument,
    pub method: ResolutionMethod,
    /// Whether the adjudicator was called, successfully or not.
    pub adjudication_attempted: bool,
    /// Why adjudication fell back to selection.
    pub adjudication_error: Option<String>,
}

/// Selection and adjudication of candidate documents.
#[derive(Debug, Clone)]
pub struct Resolver {
    scorer: QualityScorer,
    prompts: AdjudicationPromptBuilder,
    min_chars: usize,
    timeout: Option<Duration>,
}

impl Resolver {
    pub fn new(settings: &EnsembleSettings) -> Self {
        Self {
            scorer: QualityScorer::new(settings.selection.clone()),
            prompts: AdjudicationPromptBuilder::new(settings.adjudication.clone()),
            min_chars: settings.min_provider_chars,
            timeout: settings.provider_timeout(),
        }
    }

    /// Heuristic choice between the candidates.
    pub fn select(&self, primary: &str, secondary: &str) -> MarkdownDocument {
        match self.scorer.select(primary, secondary) {
            Provenance::Secondary => MarkdownDocument::new(secondary, Provenance::Secondary),
            _ => MarkdownDocument::new(primary, Provenance::Primary),
        }
    }

    /// Ask the adjudicator to re-read the image with both candidates as hints.
    pub async fn adjudicate(
        &self,
        image: &[u8],
        adjudicator: &dyn OcrProvider,
        primary: &str,
        secondary: &str,
        disagreements: &[Disagreement],
    ) -> Result<MarkdownDocument, ProviderError> {
        let instructions = self.prompts.build(primary, secondary, disagreements);
        debug!(
            "Adjudicating {} disagreements with {} ({:?} prompt, {} chars)",
            disagreements.len(),
            adjudicator.name(),
            self.prompts.strategy_for(primary, secondary),
            instructions.len()
        );

        let text = guarded_extract(
            adjudicator,
            image,
            Some(&instructions),
            self.timeout,
            self.min_chars,
        )
        .await?;
        Ok(MarkdownDocument::new(text, Provenance::Adjudicated))
    }

    /// Adjudicate when the disagreements are significant, otherwise select.
    /// A failed adjudication degrades to selection.
    pub async fn resolve(
        &self,
        image: &[u8],
        adjudicator: &dyn OcrProvider,
        primary: &str,
        secondary: &str,
        disagreements: &[Disagreement],
        significant: bool,
    ) -> Resolution {
        if !significant {
            return Resolution {
                document: self.select(primary, secondary),
                method: ResolutionMethod::Selection,
                adjudication_attempted: false,
                adjudication_error: None,
            };
        }

        match self
            .adjudicate(image, adjudicator, primary, secondary, disagreements)
            .await
        {
            Ok(document) => Resolution {
                document,
                method: ResolutionMethod::Adjudication,
                adjudication_attempted: true,
                adjudication_error: None,
            },
            Err(e) => {
                warn!("Adjudication failed, falling back to selection: {}", e);
                Resolution {
                    document: self.select(primary, secondary),
                    method: ResolutionMethod::Selection,
                    adjudication_attempted: true,
                    adjudication_error: Some(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::disagreement::DisagreementType;
    use crate::providers::ProviderMetadata;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedAdjudicator {
        reply: Result<String, String>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl OcrProvider for ScriptedAdjudicator {
        fn name(&self) -> String {
            "scripted".to_string()
        }

        fn metadata(&self) -> ProviderMetadata {
            ProviderMetadata {
                provider: "test".to_string(),
                model: "scripted".to_string(),
                capabilities: vec!["markdown".into()],
                max_tokens: 0,
                supports_context: true,
            }
        }

        async fn extract(&self, _image: &[u8]) -> Result<String, ProviderError> {
            Err(ProviderError::ExtractionFailed("plain extract not expected".into()))
        }

        async fn extract_with_context(
            &self,
            _image: &[u8],
            instructions: &str,
        ) -> Result<String, ProviderError> {
            self.seen.lock().unwrap().push(instructions.to_string());
            self.reply
                .clone()
                .map_err(ProviderError::ExtractionFailed)
        }
    }

    fn adjudicator(reply: Result<&str, &str>) -> ScriptedAdjudicator {
        ScriptedAdjudicator {
            reply: reply.map(str::to_string).map_err(str::to_string),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn total_conflict() -> Vec<Disagreement> {
        vec![Disagreement::new(
            DisagreementType::Numbers,
            "Total: $",
            "100.00",
            "150.00",
            0.9,
        )]
    }

    #[tokio::test]
    async fn test_insignificant_selects_without_calling_adjudicator() {
        let resolver = Resolver::new(&EnsembleSettings::default());
        let adj = adjudicator(Ok("# Unused"));
        let resolution = resolver
            .resolve(b"img", &adj, "# Report", "# Report", &[], false)
            .await;

        assert_eq!(resolution.method, ResolutionMethod::Selection);
        assert_eq!(resolution.document.text(), "# Report");
        assert!(!resolution.adjudication_attempted);
        assert!(adj.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_significant_adjudicates_with_candidates() {
        let resolver = Resolver::new(&EnsembleSettings::default());
        let adj = adjudicator(Ok("Total: $150.00"));
        let resolution = resolver
            .resolve(
                b"img",
                &adj,
                "Total: $100.00",
                "Total: $150.00",
                &total_conflict(),
                true,
            )
            .await;

        assert_eq!(resolution.method, ResolutionMethod::Adjudication);
        assert_eq!(resolution.document.provenance(), Provenance::Adjudicated);
        assert_eq!(resolution.document.text(), "Total: $150.00");
        let seen = adj.seen.lock().unwrap();
        assert!(seen[0].contains("Total: $100.00"));
        assert!(seen[0].contains("Total: $150.00"));
    }

    #[tokio::test]
    async fn test_adjudicator_failure_falls_back_to_selection() {
        let resolver = Resolver::new(&EnsembleSettings::default());
        let adj = adjudicator(Err("model overloaded"));
        let resolution = resolver
            .resolve(
                b"img",
                &adj,
                "Total: $100.00",
                "Total: $150.00",
                &total_conflict(),
                true,
            )
            .await;

        assert_eq!(resolution.method, ResolutionMethod::Selection);
        assert!(resolution.adjudication_attempted);
        assert!(resolution
            .adjudication_error
            .as_deref()
            .unwrap()
            .contains("model overloaded"));
        assert!(!resolution.document.text().is_empty());
    }

    #[tokio::test]
    async fn test_minimal_adjudicator_output_is_a_failure() {
        let resolver = Resolver::new(&EnsembleSettings::default());
        let adj = adjudicator(Ok(" ok "));
        let resolution = resolver
            .resolve(
                b"img",
                &adj,
                "Total: $100.00",
                "Total: $150.00",
                &total_conflict(),
                true,
            )
            .await;
        assert_eq!(resolution.method, ResolutionMethod::Selection);
        assert!(resolution.adjudication_error.is_some());
    }
}
