//! Error types for conversation storage.

use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while reading or writing threads.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The thread identifier is unusable.
    #[error("invalid thread id: {0}")]
    InvalidThreadId(String),

    /// A stored thread violates the ordering invariants.
    #[error("corrupt thread {thread_id}: {reason}")]
    Corrupt { thread_id: String, reason: String },

    /// Failed to read a thread.
    #[error("failed to read thread: {0}")]
    Read(String),

    /// Failed to write a thread.
    #[error("failed to write thread: {0}")]
    Write(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
