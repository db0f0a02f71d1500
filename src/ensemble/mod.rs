//! Dual-OCR ensemble: detect where two transcriptions disagree, resolve the
//! conflict by selection or adjudication, and decide whether to trust the
//! result.

mod confidence;
mod detector;
mod disagreement;
mod fallback;
pub mod markdown;
mod orchestrator;
mod prompt;
mod quality;
mod report;
mod resolver;
mod settings;
mod significance;

pub use confidence::{ConfidenceAssessor, ConfidenceInputs};
pub use detector::DisagreementDetector;
pub use disagreement::{Disagreement, DisagreementType};
pub use fallback::{FallbackError, FallbackExtractor, FallbackOutcome, SingleModelFallback};
pub use orchestrator::{EnsembleOrchestrator, EnsembleOrchestratorBuilder, PipelineStage};
pub use prompt::{AdjudicationPromptBuilder, PromptStrategy};
pub use quality::QualityScorer;
pub use report::{
    EnsembleReport, EnsembleResults, MarkdownDocument, ProcessingStats, Provenance,
    ProviderErrors, ProvidersUsed, ResolutionMethod, Status,
};
pub use resolver::{Resolution, Resolver};
pub use settings::{
    AdjudicationSettings, ConfidenceSettings, DetectorSettings, EnsembleSettings, NumericMode,
    QualityWeights, SelectionPolicy, SelectionSettings, SignificanceSettings,
    SignificanceStrategy,
};
pub use significance::SignificancePolicy;
