//! End-to-end ensemble run.
//!
//! ```text
//! PrepareImage -> DualExtract -> BothFailed                      -> Done
//!                             -> SingleSuccess                   -> AssessConfidence
//!                             -> DetectDisagreements -> Resolve  -> AssessConfidence
//! AssessConfidence -> [Fallback] -> Finalize -> Done
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::confidence::{ConfidenceAssessor, ConfidenceInputs};
use super::detector::DisagreementDetector;
use super::disagreement::Disagreement;
use super::fallback::FallbackExtractor;
use super::report::{EnsembleReport, MarkdownDocument, Provenance, ResolutionMethod};
use super::resolver::Resolver;
use super::settings::EnsembleSettings;
use super::significance::SignificancePolicy;
use crate::diagnostics::{DiagnosticEvent, DiagnosticSink, TracingSink};
use crate::llm::{empty_structure, tag_result, JsonExtractor};
use crate::providers::{guarded_extract, OcrProvider, ProviderError};

/// States of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    PrepareImage,
    DualExtract,
    BothFailed,
    SingleSuccess,
    DetectDisagreements,
    Resolve,
    AssessConfidence,
    Fallback,
    Finalize,
    Done,
}

/// What resolution produced before confidence is assessed.
struct Resolved {
    document: MarkdownDocument,
    method: ResolutionMethod,
    disagreements: Vec<Disagreement>,
    significant: bool,
}

/// Runs two OCR providers, reconciles their output and extracts JSON.
///
/// Holds no per-run state, so one orchestrator can serve concurrent runs.
pub struct EnsembleOrchestrator {
    primary: Arc<dyn OcrProvider>,
    secondary: Arc<dyn OcrProvider>,
    adjudicator: Arc<dyn OcrProvider>,
    json: Arc<dyn JsonExtractor>,
    fallback: Option<Arc<dyn FallbackExtractor>>,
    sink: Arc<dyn DiagnosticSink>,
    settings: EnsembleSettings,
    detector: DisagreementDetector,
    policy: SignificancePolicy,
    resolver: Resolver,
    assessor: ConfidenceAssessor,
}

/// Builder for [`EnsembleOrchestrator`].
pub struct EnsembleOrchestratorBuilder {
    primary: Arc<dyn OcrProvider>,
    secondary: Arc<dyn OcrProvider>,
    adjudicator: Option<Arc<dyn OcrProvider>>,
    json: Arc<dyn JsonExtractor>,
    fallback: Option<Arc<dyn FallbackExtractor>>,
    sink: Arc<dyn DiagnosticSink>,
    settings: EnsembleSettings,
}

impl EnsembleOrchestratorBuilder {
    /// Adjudicator provider; the primary is used when unset.
    pub fn adjudicator(mut self, adjudicator: Arc<dyn OcrProvider>) -> Self {
        self.adjudicator = Some(adjudicator);
        self
    }

    pub fn fallback(mut self, fallback: Arc<dyn FallbackExtractor>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn settings(mut self, settings: EnsembleSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> EnsembleOrchestrator {
        let settings = self.settings;
        EnsembleOrchestrator {
            adjudicator: self.adjudicator.unwrap_or_else(|| self.primary.clone()),
            primary: self.primary,
            secondary: self.secondary,
            json: self.json,
            fallback: self.fallback,
            sink: self.sink,
            detector: DisagreementDetector::new(settings.detector.clone()),
            policy: SignificancePolicy::new(settings.significance.clone()),
            resolver: Resolver::new(&settings),
            assessor: ConfidenceAssessor::new(settings.confidence.clone()),
            settings,
        }
    }
}

impl EnsembleOrchestrator {
    pub fn builder(
        primary: Arc<dyn OcrProvider>,
        secondary: Arc<dyn OcrProvider>,
        json: Arc<dyn JsonExtractor>,
    ) -> EnsembleOrchestratorBuilder {
        EnsembleOrchestratorBuilder {
            primary,
            secondary,
            adjudicator: None,
            json,
            fallback: None,
            sink: Arc::new(TracingSink),
            settings: EnsembleSettings::default(),
        }
    }

    pub fn settings(&self) -> &EnsembleSettings {
        &self.settings
    }

    pub fn primary(&self) -> &Arc<dyn OcrProvider> {
        &self.primary
    }

    pub fn secondary(&self) -> &Arc<dyn OcrProvider> {
        &self.secondary
    }

    pub fn adjudicator(&self) -> &Arc<dyn OcrProvider> {
        &self.adjudicator
    }

    /// Name of the fallback extractor, if one is configured.
    pub fn fallback_name(&self) -> Option<String> {
        self.fallback.as_ref().map(|f| f.name())
    }

    /// Run the full pipeline on one page image.
    ///
    /// Never fails: every failure is reported inside the returned report.
    pub async fn process(&self, image: &[u8], schema: &Value) -> EnsembleReport {
        let started = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        let mut report = EnsembleReport::new(&run_id);
        report.providers_used.primary = self.primary.name();
        report.providers_used.secondary = self.secondary.name();

        self.enter(&run_id, PipelineStage::PrepareImage);
        if image.is_empty() {
            report.fail("Empty image input");
            return self.finish(&run_id, report, started);
        }
        report.image_sha256 = Some(hex::encode(Sha256::digest(image)));
        report.mime_type = Some(
            infer::get(image)
                .map(|kind| kind.mime_type())
                .unwrap_or("application/octet-stream")
                .to_string(),
        );

        self.enter(&run_id, PipelineStage::DualExtract);
        let (primary, secondary) = self.dual_extract(image).await;
        self.record_provider(&run_id, "primary", &self.primary, &primary);
        self.record_provider(&run_id, "secondary", &self.secondary, &secondary);

        if let Ok(ref text) = primary {
            report.ensemble_results.primary_markdown = text.clone();
            report.processing_stats.primary_length = text.chars().count();
        }
        if let Ok(ref text) = secondary {
            report.ensemble_results.secondary_markdown = text.clone();
            report.processing_stats.secondary_length = text.chars().count();
        }
        report.provider_errors.primary = primary.as_ref().err().map(|e| e.to_string());
        report.provider_errors.secondary = secondary.as_ref().err().map(|e| e.to_string());

        let primary_ok = primary.is_ok();
        let secondary_ok = secondary.is_ok();

        let resolved = match (primary, secondary) {
            (Err(primary_err), Err(secondary_err)) => {
                self.enter(&run_id, PipelineStage::BothFailed);
                report.fail(format!(
                    "Both OCR models failed (primary: {}; secondary: {})",
                    primary_err, secondary_err
                ));
                report.ensemble_results.resolution_method = Some(ResolutionMethod::BothFailed);
                report.ensemble_results.ensemble_confidence =
                    self.assessor.assess(&ConfidenceInputs {
                        primary_succeeded: false,
                        secondary_succeeded: false,
                        final_chars: 0,
                        disagreement_count: 0,
                        adjudicated: false,
                    });
                return self.finish(&run_id, report, started);
            }
            (Ok(text), Err(_)) => {
                self.enter(&run_id, PipelineStage::SingleSuccess);
                Resolved {
                    document: MarkdownDocument::new(text, Provenance::Primary),
                    method: ResolutionMethod::SecondaryFailed,
                    disagreements: Vec::new(),
                    significant: false,
                }
            }
            (Err(_), Ok(text)) => {
                self.enter(&run_id, PipelineStage::SingleSuccess);
                Resolved {
                    document: MarkdownDocument::new(text, Provenance::Secondary),
                    method: ResolutionMethod::PrimaryFailed,
                    disagreements: Vec::new(),
                    significant: false,
                }
            }
            (Ok(primary_text), Ok(secondary_text)) => {
                self.resolve_pair(&run_id, &mut report, image, &primary_text, &secondary_text)
                    .await
            }
        };
        self.sink.record(
            &run_id,
            DiagnosticEvent::Resolved {
                method: resolved.method,
            },
        );

        self.enter(&run_id, PipelineStage::AssessConfidence);
        let confidence = self.assessor.assess(&ConfidenceInputs {
            primary_succeeded: primary_ok,
            secondary_succeeded: secondary_ok,
            final_chars: resolved.document.char_count(),
            disagreement_count: resolved.disagreements.len(),
            adjudicated: resolved.method == ResolutionMethod::Adjudication,
        });
        self.sink.record(
            &run_id,
            DiagnosticEvent::ConfidenceAssessed {
                confidence,
                threshold: self.assessor.fallback_threshold(),
            },
        );

        let mut final_document = resolved.document;
        let mut extracted_json = None;

        if self.assessor.needs_fallback(confidence) {
            if let Some(ref fallback) = self.fallback {
                self.enter(&run_id, PipelineStage::Fallback);
                self.sink
                    .record(&run_id, DiagnosticEvent::FallbackTriggered { confidence });
                match fallback.run(image, schema).await {
                    Ok(outcome) => {
                        report.ensemble_fallback = true;
                        report.fallback_confidence = Some(confidence);
                        report.providers_used.fallback = Some(outcome.provider);
                        final_document = MarkdownDocument::new(outcome.markdown, Provenance::Fallback);
                        extracted_json = Some(outcome.extracted_json);
                    }
                    Err(e) => {
                        self.sink.record(
                            &run_id,
                            DiagnosticEvent::FallbackFailed {
                                error: e.to_string(),
                            },
                        );
                    }
                }
            }
        }

        self.enter(&run_id, PipelineStage::Finalize);
        let extracted_json = match extracted_json {
            Some(value) => value,
            None => self.extract_json(&run_id, final_document.text(), schema).await,
        };

        let results = &mut report.ensemble_results;
        results.disagreement_count = resolved.disagreements.len();
        results.disagreements = resolved.disagreements;
        results.has_significant_disagreements = resolved.significant;
        results.resolution_method = Some(resolved.method);
        results.final_provenance = Some(final_document.provenance());
        results.ensemble_confidence = confidence;
        results.extracted_json = extracted_json;
        report.processing_stats.final_length = final_document.char_count();
        report.ensemble_results.final_markdown = final_document.into_text();

        self.finish(&run_id, report, started)
    }

    async fn dual_extract(
        &self,
        image: &[u8],
    ) -> (Result<String, ProviderError>, Result<String, ProviderError>) {
        let timeout = self.settings.provider_timeout();
        let min_chars = self.settings.min_provider_chars;
        let primary = guarded_extract(self.primary.as_ref(), image, None, timeout, min_chars);
        let secondary = guarded_extract(self.secondary.as_ref(), image, None, timeout, min_chars);

        if self.settings.concurrent_extraction {
            tokio::join!(primary, secondary)
        } else {
            (primary.await, secondary.await)
        }
    }

    async fn resolve_pair(
        &self,
        run_id: &str,
        report: &mut EnsembleReport,
        image: &[u8],
        primary: &str,
        secondary: &str,
    ) -> Resolved {
        self.enter(run_id, PipelineStage::DetectDisagreements);
        let disagreements = self.detect_off_runtime(primary, secondary).await;
        let significant = self.policy.is_significant(&disagreements);
        self.sink.record(
            run_id,
            DiagnosticEvent::DisagreementsDetected {
                count: disagreements.len(),
                significant,
            },
        );

        self.enter(run_id, PipelineStage::Resolve);
        let resolution = self
            .resolver
            .resolve(
                image,
                self.adjudicator.as_ref(),
                primary,
                secondary,
                &disagreements,
                significant,
            )
            .await;

        if resolution.adjudication_attempted {
            report.providers_used.adjudicator = Some(self.adjudicator.name());
        }
        if let Some(ref error) = resolution.adjudication_error {
            self.sink.record(
                run_id,
                DiagnosticEvent::AdjudicationFailed {
                    provider: self.adjudicator.name(),
                    error: error.clone(),
                },
            );
        }
        report.ensemble_results.adjudication_error = resolution.adjudication_error;

        Resolved {
            document: resolution.document,
            method: resolution.method,
            disagreements,
            significant,
        }
    }

    /// Detection is quadratic in the feature counts, so it runs on the
    /// blocking pool rather than a runtime worker.
    async fn detect_off_runtime(&self, primary: &str, secondary: &str) -> Vec<Disagreement> {
        let detector = self.detector.clone();
        let (a, b) = (primary.to_owned(), secondary.to_owned());
        match tokio::task::spawn_blocking(move || detector.detect(&a, &b)).await {
            Ok(disagreements) => disagreements,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            // Cancelled during runtime shutdown.
            Err(_) => self.detector.detect(primary, secondary),
        }
    }

    async fn extract_json(&self, run_id: &str, markdown: &str, schema: &Value) -> Value {
        match self.json.extract(markdown, schema).await {
            Ok(value) => value,
            Err(e) => {
                self.sink.record(
                    run_id,
                    DiagnosticEvent::JsonExtractionFailed {
                        error: e.to_string(),
                    },
                );
                tag_result(empty_structure(schema), "_extraction_error", &e.to_string())
            }
        }
    }

    fn record_provider(
        &self,
        run_id: &str,
        slot: &str,
        provider: &Arc<dyn OcrProvider>,
        result: &Result<String, ProviderError>,
    ) {
        let event = match result {
            Ok(text) => DiagnosticEvent::ProviderSucceeded {
                slot: slot.to_string(),
                provider: provider.name(),
                chars: text.chars().count(),
            },
            Err(e) => DiagnosticEvent::ProviderFailed {
                slot: slot.to_string(),
                provider: provider.name(),
                error: e.to_string(),
            },
        };
        self.sink.record(run_id, event);
    }

    fn enter(&self, run_id: &str, stage: PipelineStage) {
        self.sink
            .record(run_id, DiagnosticEvent::StageEntered { stage });
    }

    fn finish(&self, run_id: &str, mut report: EnsembleReport, started: Instant) -> EnsembleReport {
        report.processing_stats.elapsed_ms = started.elapsed().as_millis() as u64;
        self.enter(run_id, PipelineStage::Done);
        report
    }
}
