//! Dual-model OCR ensemble.
//!
//! Two vision models transcribe the same page image to markdown. The
//! transcriptions are compared for disagreements; significant conflicts are
//! sent to an adjudicator model, otherwise the better-scoring transcription
//! is selected. The result is scored for confidence, optionally replaced by a
//! single-model fallback, and turned into JSON by an LLM.

pub mod acquire;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod ensemble;
pub mod evaluation;
pub mod llm;
pub mod providers;
pub mod server;
