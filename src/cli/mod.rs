//! CLI module for healthrag
//!
//! Handles command-line argument parsing and configuration management.

pub mod args;
pub mod config;

pub use args::{Args, Commands, Mode, Verbosity};
pub use config::{Config, OllamaConfig};
