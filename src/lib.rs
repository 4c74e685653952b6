//! healthrag - grounded healthcare question answering
//!
//! Retrieves candidate chunks from a vector knowledge base, keeps one chunk
//! per trusted source page, gates the survivors on their distance to the best
//! match and assembles a bounded, source-tagged context for a local LLM.
//!
//! # Architecture
//!
//! - [`rag`]: candidate pools, deduplication, margin-gated selection, context
//!   assembly and the two retrieval strategies
//! - [`store`] / [`llm`]: the Qdrant retriever and Ollama generator behind the
//!   `Retriever` and `Generator` seams
//! - [`answer`] / [`question`]: input extraction and answer synthesis
//! - [`cli`] / [`doctor`] / [`telemetry`]: the command-line surface

pub mod answer;
pub mod cli;
pub mod doctor;
pub mod errors;
pub mod llm;
pub mod question;
pub mod rag;
pub mod store;
pub mod telemetry;

pub use errors::{RagError, Result};
