//! Configuration management using the prefer crate.
//!
//! A config file (`ocr-ensemble.toml`, `.yaml` or `.json`) is discovered in
//! the standard locations, or passed explicitly with `--config`. Anything not
//! in the file falls back to defaults, and environment variables override
//! provider selection and the LLM settings.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::diagnostics::DiagnosticSink;
use crate::ensemble::{EnsembleOrchestrator, EnsembleSettings, SingleModelFallback};
use crate::llm::{JsonExtractor, LlmConfig, LlmJsonExtractor};
use crate::providers::{create_provider, ProviderKind, ProviderSpec};

/// Application name used for config discovery.
pub const APP_NAME: &str = "ocr-ensemble";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {format} config: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },
}

/// Which providers fill each pipeline slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_primary")]
    pub primary: ProviderSpec,
    #[serde(default = "default_secondary")]
    pub secondary: ProviderSpec,
    /// Defaults to the primary provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjudicator: Option<ProviderSpec>,
    /// Defaults to the primary provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<ProviderSpec>,
    /// Run the single-model fallback when confidence is low.
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,
}

fn default_primary() -> ProviderSpec {
    ProviderSpec::new(ProviderKind::OpenAi)
}

fn default_secondary() -> ProviderSpec {
    ProviderSpec::new(ProviderKind::Gemini)
}

fn default_true() -> bool {
    true
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            secondary: default_secondary(),
            adjudicator: None,
            fallback: None,
            fallback_enabled: true,
        }
    }
}

impl ProvidersConfig {
    pub fn adjudicator_spec(&self) -> &ProviderSpec {
        self.adjudicator.as_ref().unwrap_or(&self.primary)
    }

    pub fn fallback_spec(&self) -> &ProviderSpec {
        self.fallback.as_ref().unwrap_or(&self.primary)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars, each `kind` or `kind:model`:
    /// - `OCR_PRIMARY`
    /// - `OCR_SECONDARY`
    /// - `OCR_ADJUDICATOR`
    /// - `OCR_FALLBACK`
    pub fn with_env_overrides(mut self) -> Self {
        let parse = |var: &str| {
            std::env::var(var)
                .ok()
                .and_then(|value| ProviderSpec::parse(&value))
        };
        if let Some(spec) = parse("OCR_PRIMARY") {
            self.primary = spec;
        }
        if let Some(spec) = parse("OCR_SECONDARY") {
            self.secondary = spec;
        }
        if let Some(spec) = parse("OCR_ADJUDICATOR") {
            self.adjudicator = Some(spec);
        }
        if let Some(spec) = parse("OCR_FALLBACK") {
            self.fallback = Some(spec);
        }
        self
    }
}

/// HTTP server defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3030
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub ensemble: EnsembleSettings,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// File the config was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer for discovery.
    ///
    /// Falls back to defaults when no file is found or it cannot be parsed.
    pub async fn load() -> Self {
        match prefer::load(APP_NAME).await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            debug!("Ignoring unreadable config {}: {}", path.display(), e);
                            Self::default_with_env()
                        }
                    }
                } else {
                    Self::default_with_env()
                }
            }
            Err(_) => Self::default_with_env(),
        }
    }

    /// Load from an explicit path when given, otherwise discover.
    pub async fn load_with(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_path(path).await,
            None => Ok(Self::load().await),
        }
    }

    /// Defaults with environment variable overrides applied.
    pub fn default_with_env() -> Self {
        let mut config = Self::default();
        config.providers = config.providers.with_env_overrides();
        config
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path.to_path_buf());
        config.providers = config.providers.with_env_overrides();
        config.llm = config.llm.with_env_overrides();
        Ok(config)
    }

    /// Parse config text in the format named by `ext`.
    pub fn parse(contents: &str, ext: &str) -> Result<Self, ConfigError> {
        match ext {
            "toml" => toml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "TOML",
                message: e.to_string(),
            }),
            "yaml" | "yml" => serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "YAML",
                message: e.to_string(),
            }),
            _ => serde_json::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "JSON",
                message: e.to_string(),
            }),
        }
    }

    /// Effective settings as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Build the pipeline described by this configuration.
    pub fn build_orchestrator(&self, sink: Arc<dyn DiagnosticSink>) -> EnsembleOrchestrator {
        let json: Arc<dyn JsonExtractor> = Arc::new(LlmJsonExtractor::new(self.llm.clone()));
        let primary = create_provider(&self.providers.primary);
        let secondary = create_provider(&self.providers.secondary);
        let adjudicator = create_provider(self.providers.adjudicator_spec());

        let mut builder = EnsembleOrchestrator::builder(primary, secondary, json.clone())
            .adjudicator(adjudicator)
            .settings(self.ensemble.clone())
            .sink(sink);

        if self.providers.fallback_enabled {
            let fallback = SingleModelFallback::new(
                create_provider(self.providers.fallback_spec()),
                json,
            )
            .with_min_chars(self.ensemble.min_provider_chars)
            .with_timeout(self.ensemble.provider_timeout());
            builder = builder.fallback(Arc::new(fallback));
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::SignificanceStrategy;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.providers.primary.kind, ProviderKind::OpenAi);
        assert_eq!(config.providers.secondary.kind, ProviderKind::Gemini);
        assert_eq!(config.providers.adjudicator_spec().kind, ProviderKind::OpenAi);
        assert_eq!(config.providers.fallback_spec().kind, ProviderKind::OpenAi);
        assert_eq!(config.server.port, 3030);
        assert_eq!(config.ensemble.min_provider_chars, 5);
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[providers.primary]
kind = "gemini"
model = "gemini-1.5-pro"

[providers.secondary]
kind = "groq"

[providers.adjudicator]
kind = "openai"

[ensemble.significance]
strategy = "numeric_magnitude"
"#;
        let config = Config::parse(toml_str, "toml").unwrap();
        assert_eq!(config.providers.primary.kind, ProviderKind::Gemini);
        assert_eq!(
            config.providers.primary.model.as_deref(),
            Some("gemini-1.5-pro")
        );
        assert_eq!(config.providers.adjudicator_spec().kind, ProviderKind::OpenAi);
        assert_eq!(config.providers.fallback_spec().kind, ProviderKind::Gemini);
        assert_eq!(
            config.ensemble.significance.strategy,
            SignificanceStrategy::NumericMagnitude
        );
    }

    #[test]
    fn test_parse_yaml_and_json() {
        let yaml = "server:\n  port: 9000\nensemble:\n  concurrent_extraction: false\n";
        let config = Config::parse(yaml, "yaml").unwrap();
        assert_eq!(config.server.port, 9000);
        assert!(!config.ensemble.concurrent_extraction);

        let json = r#"{"providers": {"fallback_enabled": false}}"#;
        let config = Config::parse(json, "json").unwrap();
        assert!(!config.providers.fallback_enabled);
    }

    #[test]
    fn test_parse_error_names_format() {
        let err = Config::parse("[[[", "toml").unwrap_err();
        assert!(err.to_string().contains("TOML"));
    }

    #[tokio::test]
    async fn test_load_from_path_records_source() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ocr-ensemble.toml");
        std::fs::write(&path, "[server]\nport = 8123\n").unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.server.port, 8123);
        assert_eq!(config.source_path.as_deref(), Some(path.as_path()));

        let missing = Config::load_from_path(&temp.path().join("nope.toml")).await;
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = Config::default();
        let rendered = config.to_toml().unwrap();
        let parsed = Config::parse(&rendered, "toml").unwrap();
        assert_eq!(parsed.ensemble, config.ensemble);
        assert_eq!(parsed.providers, config.providers);
    }
}
