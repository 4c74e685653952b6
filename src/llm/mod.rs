//! Generation collaborator
//!
//! The [`Generator`] trait is the seam the pipeline plans and answers
//! through; [`OllamaClient`] is the production implementation.

pub mod client;

pub use client::{Generator, OllamaClient, DEFAULT_MODEL, DEFAULT_OLLAMA_URL};
