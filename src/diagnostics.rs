//! Per-run diagnostic events.
//!
//! The orchestrator reports what happens during a run to a caller-supplied
//! [`DiagnosticSink`] instead of a global logger. [`TracingSink`] forwards
//! events to `tracing`; [`MemorySink`] keeps them for inspection.

use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ensemble::{PipelineStage, ResolutionMethod};

/// Something that happened during one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    StageEntered {
        stage: PipelineStage,
    },
    ProviderSucceeded {
        slot: String,
        provider: String,
        chars: usize,
    },
    ProviderFailed {
        slot: String,
        provider: String,
        error: String,
    },
    DisagreementsDetected {
        count: usize,
        significant: bool,
    },
    Resolved {
        method: ResolutionMethod,
    },
    AdjudicationFailed {
        provider: String,
        error: String,
    },
    ConfidenceAssessed {
        confidence: f64,
        threshold: f64,
    },
    FallbackTriggered {
        confidence: f64,
    },
    FallbackFailed {
        error: String,
    },
    JsonExtractionFailed {
        error: String,
    },
}

/// Receiver of diagnostic events.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, run_id: &str, event: DiagnosticEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, run_id: &str, event: DiagnosticEvent) {
        match event {
            DiagnosticEvent::StageEntered { stage } => {
                debug!("[{}] Entering stage {:?}", run_id, stage)
            }
            DiagnosticEvent::ProviderSucceeded {
                slot,
                provider,
                chars,
            } => debug!("[{}] {} ({}) returned {} chars", run_id, slot, provider, chars),
            DiagnosticEvent::ProviderFailed {
                slot,
                provider,
                error,
            } => warn!("[{}] {} ({}) failed: {}", run_id, slot, provider, error),
            DiagnosticEvent::DisagreementsDetected { count, significant } => info!(
                "[{}] {} disagreements detected (significant: {})",
                run_id, count, significant
            ),
            DiagnosticEvent::Resolved { method } => {
                info!("[{}] Resolved by {}", run_id, method)
            }
            DiagnosticEvent::AdjudicationFailed { provider, error } => warn!(
                "[{}] Adjudication with {} failed: {}",
                run_id, provider, error
            ),
            DiagnosticEvent::ConfidenceAssessed {
                confidence,
                threshold,
            } => info!(
                "[{}] Ensemble confidence {:.2} (fallback below {:.2})",
                run_id, confidence, threshold
            ),
            DiagnosticEvent::FallbackTriggered { confidence } => warn!(
                "[{}] Low confidence ({:.2}), running single-model fallback",
                run_id, confidence
            ),
            DiagnosticEvent::FallbackFailed { error } => {
                warn!("[{}] Fallback failed, keeping ensemble result: {}", run_id, error)
            }
            DiagnosticEvent::JsonExtractionFailed { error } => {
                warn!("[{}] JSON extraction failed: {}", run_id, error)
            }
        }
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn record(&self, _run_id: &str, _event: DiagnosticEvent) {}
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<(String, DiagnosticEvent)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far, in order.
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events
            .lock()
            .map(|events| events.iter().map(|(_, e)| e.clone()).collect())
            .unwrap_or_default()
    }

    /// Stages entered, in order.
    pub fn stages(&self) -> Vec<PipelineStage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DiagnosticEvent::StageEntered { stage } => Some(stage),
                _ => None,
            })
            .collect()
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&self, run_id: &str, event: DiagnosticEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push((run_id.to_string(), event));
        }
    }
}
