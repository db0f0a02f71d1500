//! Text-model client used to turn the final markdown into structured JSON.
//!
//! Supports OpenAI-compatible APIs (default) and local Ollama.

mod client;
mod config;
mod extractor;
mod prompts;

pub use client::{LlmClient, LlmError};
pub use config::{LlmConfig, LlmProvider};
pub use extractor::{empty_structure, tag_result, JsonExtractor, LlmJsonExtractor};
