//! Error types for ragpilot
//!
//! One taxonomy for the whole request path. Provider failures carry the
//! kind of call that failed; context exhaustion and generation failures are
//! always fatal to the request.

use thiserror::Error;

/// Main error type for retrieval and answer generation
#[derive(Error, Debug)]
pub enum RagError {
    /// Search backend unreachable, rejected the request, or returned a malformed response
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// Vectorization failed
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// Completion call failed
    #[error("Generation failed: {0}")]
    Generation(String),

    /// No passage fits the context budget
    #[error("Context exhausted: no passage fits within {budget} tokens ({candidates} candidates)")]
    ContextExhausted { budget: usize, candidates: usize },

    /// Missing or invalid provider configuration (startup only)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Per-request options out of range
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Request cancelled between steps
    #[error("Request cancelled")]
    Cancelled,

    /// HTTP client construction errors
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    /// Whether the error came from an external provider call
    pub fn is_provider_error(&self) -> bool {
        matches!(
            self,
            RagError::Retrieval(_) | RagError::Embedding(_) | RagError::Generation(_)
        )
    }
}

/// Result type alias for ragpilot operations
pub type Result<T> = std::result::Result<T, RagError>;
