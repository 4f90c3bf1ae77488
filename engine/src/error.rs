//! Error types for turn orchestration.

use std::time::Duration;

use mall_conversation::StoreError;
use mall_retrieval::RetrievalError;
use thiserror::Error;

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, TurnError>;

/// Errors raised by a generation backend.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// No API key configured.
    #[error("generation client not configured")]
    NotConfigured,

    /// The API answered with an error status.
    #[error("generation request failed: {0}")]
    Api(String),

    /// Rate limited.
    #[error("rate limited, retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    /// No answer within the deadline.
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    /// The model produced nothing usable.
    #[error("malformed model output: {0}")]
    MalformedOutput(String),

    /// HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GenerationError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GenerationError::NotConfigured)
    }
}

/// The external call that aborted a turn.
#[derive(Error, Debug)]
pub enum FailureCause {
    #[error("retrieval: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("generation: {0}")]
    Generation(#[from] GenerationError),
}

/// Errors that abort a turn. None of them leaves a write behind.
#[derive(Error, Debug)]
pub enum TurnError {
    /// Empty utterance, malformed thread id or unusable override.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// History could not be loaded.
    #[error("thread store failure: {0}")]
    ThreadStore(#[source] StoreError),

    /// Retrieval or generation failed.
    #[error("turn failed: {cause}")]
    TurnFailed {
        #[source]
        cause: FailureCause,
    },

    /// The caller cancelled the turn before it produced a reply.
    #[error("turn cancelled")]
    Cancelled,
}

impl TurnError {
    /// Whether resubmitting the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TurnError::InvalidInput(_) | TurnError::Cancelled => false,
            TurnError::ThreadStore(e) => matches!(e, StoreError::Read(_) | StoreError::Write(_)),
            TurnError::TurnFailed { cause } => match cause {
                FailureCause::Retrieval(e) => e.is_retryable(),
                FailureCause::Generation(e) => e.is_retryable(),
            },
        }
    }
}

impl From<RetrievalError> for TurnError {
    fn from(err: RetrievalError) -> Self {
        TurnError::TurnFailed { cause: err.into() }
    }
}

impl From<GenerationError> for TurnError {
    fn from(err: GenerationError) -> Self {
        TurnError::TurnFailed { cause: err.into() }
    }
}
