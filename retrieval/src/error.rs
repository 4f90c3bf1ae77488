//! Error types for shop retrieval.

use mall_embeddings::EmbeddingError;
use thiserror::Error;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur while retrieving shops.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Blank query text or a zero `top_k`.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The query could not be embedded (provider error or timeout).
    #[error("embedding failure: {0}")]
    EmbeddingFailure(#[source] EmbeddingError),

    /// The semantic index could not be searched (service error or timeout).
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(#[source] EmbeddingError),
}

impl RetrievalError {
    /// Outages and timeouts may succeed on retry; bad input and a missing
    /// provider configuration never will.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidQuery(_) => false,
            Self::EmbeddingFailure(e) | Self::RetrievalUnavailable(e) => e.is_transient(),
        }
    }
}
