//! # Embeddings
//!
//! Vectors for shop documents and visitor queries, and exact cosine search
//! over them.
//!
//! ```text
//! text ──► EmbeddingProvider ──► Vec<f32>
//!            (OpenAI, CachedProvider)   │
//!                                       ▼
//!                  SimilarityIndex ◄── add (ingest)
//!                        │
//!                        └──► SemanticIndex::search (retrieval, read-only)
//! ```

pub mod cache;
pub mod error;
pub mod index;
pub mod provider;
pub mod similarity;

pub use cache::{CachedProvider, EmbeddingCache};
pub use error::{EmbeddingError, Result};
pub use index::{IndexEntry, SemanticIndex, SimilarityIndex};
pub use provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, OpenAIProvider};
pub use similarity::{SimilarityResult, cosine_similarity};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// Dimension of embeddings produced by the default model.
pub const DEFAULT_DIMENSION: usize = 1536; // OpenAI text-embedding-3-small
