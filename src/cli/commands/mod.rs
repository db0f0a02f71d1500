//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod compare;
mod config_cmd;
mod evaluate;
mod process;
mod providers;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "ocr-ensemble")]
#[command(about = "Dual-model OCR with disagreement detection and adjudication")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ensemble on an image or PDF (first page)
    Process {
        /// Image or PDF file
        file: PathBuf,
        /// JSON schema file describing the fields to extract
        #[arg(short, long)]
        schema: Option<PathBuf>,
        /// Write the report to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Emit compact JSON
        #[arg(long)]
        compact: bool,
    },

    /// Compare two markdown transcriptions without calling any model
    Compare {
        /// First markdown file (treated as primary)
        a: PathBuf,
        /// Second markdown file (treated as secondary)
        b: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Score predictions against ground truth
    Evaluate {
        #[command(subcommand)]
        command: EvaluateCommands,
    },

    /// Show configured providers
    Providers {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Start the HTTP server
    Serve {
        /// Address to bind to (port, host, or host:port)
        bind: Option<String>,
    },
}

#[derive(Subcommand)]
enum EvaluateCommands {
    /// Score a markdown transcription (CER, WER, word and table accuracy)
    Markdown {
        /// Ground-truth markdown file
        reference: PathBuf,
        /// Predicted markdown file
        prediction: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Score an extracted JSON document (similarity and per-field accuracy)
    Json {
        /// Ground-truth JSON file
        reference: PathBuf,
        /// Predicted JSON file
        prediction: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Score a JSON array of samples and summarize
    Dataset {
        /// Samples file
        file: PathBuf,
        /// Also write the full report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Get a single value by dotted path (e.g., ensemble.confidence.baseline)
    Get {
        setting: String,
    },
    /// Show which config file was loaded
    Path,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load_with(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Process {
            file,
            schema,
            output,
            compact,
        } => {
            process::cmd_process(
                &config,
                &file,
                schema.as_deref(),
                output.as_deref(),
                compact,
            )
            .await
        }
        Commands::Compare { a, b, json } => compare::cmd_compare(&config, &a, &b, json).await,
        Commands::Evaluate { command } => match command {
            EvaluateCommands::Markdown {
                reference,
                prediction,
                json,
            } => evaluate::cmd_evaluate_markdown(&reference, &prediction, json).await,
            EvaluateCommands::Json {
                reference,
                prediction,
                json,
            } => evaluate::cmd_evaluate_json(&reference, &prediction, json).await,
            EvaluateCommands::Dataset { file, output, json } => {
                evaluate::cmd_evaluate_dataset(&file, output.as_deref(), json).await
            }
        },
        Commands::Providers { json } => providers::cmd_providers(&config, json),
        Commands::Config { command } => match command {
            ConfigCommands::Show => config_cmd::cmd_config_show(&config),
            ConfigCommands::Get { setting } => config_cmd::cmd_config_get(&config, &setting),
            ConfigCommands::Path => config_cmd::cmd_config_path(&config),
        },
        Commands::Serve { bind } => serve::cmd_serve(config, bind.as_deref()).await,
    }
}
