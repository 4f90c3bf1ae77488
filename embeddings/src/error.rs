//! Embedding and index errors.

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EmbeddingError>;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// No API key was configured.
    #[error("embedding provider not configured")]
    ProviderNotConfigured,

    /// The provider answered with a non-success status.
    #[error("embedding request failed: {0}")]
    ApiRequest(String),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The index backing a search could not serve the request.
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EmbeddingError {
    /// Whether the same call may succeed later without any change on the
    /// caller's side.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EmbeddingError::ApiRequest(_)
                | EmbeddingError::RateLimited { .. }
                | EmbeddingError::Timeout(_)
                | EmbeddingError::IndexUnavailable(_)
                | EmbeddingError::Http(_)
        )
    }
}
