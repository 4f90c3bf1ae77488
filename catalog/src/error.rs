//! Error types for the shop catalog.

use thiserror::Error;

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors that can occur while loading or ingesting shops.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// A shop entry is missing required data.
    #[error("invalid shop record at position {position}: {reason}")]
    InvalidRecord { position: usize, reason: String },

    /// Embedding the catalog failed.
    #[error("embedding error: {0}")]
    Embedding(#[from] mall_embeddings::EmbeddingError),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
