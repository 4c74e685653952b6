//! Error types for healthrag
//!
//! Collaborator failures (retrieval, planning) are absorbed inside the
//! pipeline and only surface here when a caller talks to a collaborator
//! directly. `InvalidInput` is the only error the pipeline itself returns.

use thiserror::Error;

/// Main error type for the retrieval and answer pipeline
#[derive(Error, Debug)]
pub enum RagError {
    /// Empty or whitespace-only question
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Retrieval collaborator errored
    #[error("Retrieval failed for query '{query}': {reason}")]
    RetrievalFailure { query: String, reason: String },

    /// Generation collaborator errored while planning sub-queries
    #[error("Query planning failed: {0}")]
    PlanningFailure(String),

    /// Generation collaborator errored while producing text
    #[error("Generation error: {0}")]
    GenerationError(String),

    /// Collaborator call or question budget exceeded
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{0}")]
    Generic(String),
}

impl RagError {
    /// Whether the pipeline must stop instead of degrading
    pub fn is_fatal(&self) -> bool {
        matches!(self, RagError::InvalidInput(_) | RagError::ConfigError(_))
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, RagError>;

/// Convert anyhow errors to RagError
impl From<anyhow::Error> for RagError {
    fn from(err: anyhow::Error) -> Self {
        RagError::Generic(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RagError::RetrievalFailure {
            query: "asthma symptoms".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("asthma symptoms"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_timeout_display() {
        let err = RagError::Timeout { duration_ms: 30000 };
        assert!(err.to_string().contains("30000"));
    }

    #[test]
    fn test_only_input_and_config_are_fatal() {
        assert!(RagError::InvalidInput("empty".into()).is_fatal());
        assert!(RagError::ConfigError("k".into()).is_fatal());
        assert!(!RagError::PlanningFailure("garbage".into()).is_fatal());
        assert!(!RagError::Timeout { duration_ms: 1 }.is_fatal());
    }

    #[test]
    fn test_from_anyhow_keeps_context_chain() {
        let err: RagError = anyhow::anyhow!("root cause").context("outer").into();
        let text = err.to_string();
        assert!(text.contains("outer"));
        assert!(text.contains("root cause"));
    }
}
