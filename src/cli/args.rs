//! Command-line argument parsing for healthrag
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::Config;
use crate::rag::Strategy;

/// healthrag - grounded answers to health questions from a trusted knowledge base
#[derive(Parser, Debug)]
#[command(name = "healthrag")]
#[command(version)]
#[command(about = "Answer health questions from trusted sources only", long_about = None)]
pub struct Args {
    /// Question to answer (read from stdin when omitted)
    #[arg(value_name = "QUESTION")]
    pub question: Option<String>,

    /// Retrieval strategy to run
    #[arg(long, value_enum, default_value_t = Mode::Both)]
    pub mode: Mode,

    /// Ollama model (overrides config)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Ollama host (overrides config)
    #[arg(long)]
    pub host: Option<String>,

    /// Ollama port (overrides config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Qdrant URL (overrides config)
    #[arg(long)]
    pub qdrant_url: Option<String>,

    /// Qdrant collection (overrides config)
    #[arg(long)]
    pub collection: Option<String>,

    /// Number of unique sources to select (overrides config)
    #[arg(short = 'k', long)]
    pub sources: Option<usize>,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print the retrieval trace after each answer
    #[arg(long)]
    pub trace: bool,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress all output except the answers)
    #[arg(short, long)]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Check Ollama and Qdrant are reachable
    Doctor,

    /// Display the effective configuration as TOML
    Config,
}

/// Which strategies to run for a question
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Vanilla,
    Agentic,
    Both,
}

impl Mode {
    pub fn strategies(&self) -> Vec<Strategy> {
        match self {
            Mode::Vanilla => vec![Strategy::SingleQuery],
            Mode::Agentic => vec![Strategy::MultiQuery],
            Mode::Both => vec![Strategy::SingleQuery, Strategy::MultiQuery],
        }
    }
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }

    /// Reject flag combinations clap cannot express
    pub fn validate(&self) -> Result<(), String> {
        if self.command.is_some() && self.question.is_some() {
            return Err("Cannot specify a question with a subcommand.".to_string());
        }

        if self.sources == Some(0) {
            return Err("--sources must be greater than 0.".to_string());
        }

        Ok(())
    }

    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.ollama.model = model.clone();
        }
        if let Some(host) = &self.host {
            config.ollama.host = host.clone();
        }
        if let Some(port) = self.port {
            config.ollama.port = port;
        }
        if let Some(url) = &self.qdrant_url {
            config.store.url = url.clone();
        }
        if let Some(collection) = &self.collection {
            config.store.collection = collection.clone();
        }
        if let Some(k) = self.sources {
            config.retrieval.target_sources = k;
        }
    }
}

impl Verbosity {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Default `tracing` filter directive for this level
    pub fn log_filter(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "healthrag=info,warn",
            Verbosity::VeryVerbose => "healthrag=debug,info",
        }
    }

    /// Check if should show progress spinners
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }

    /// Check if should show the retrieval trace
    pub fn show_trace(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }
}
