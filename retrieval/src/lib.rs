//! # Shop Retrieval
//!
//! Turns a visitor utterance into a short, ranked list of shops:
//!
//! ```text
//! query ──► EmbeddingProvider ──► SemanticIndex (top_k × overfetch)
//!                                        │
//!                                        ▼
//!                        hydrate + dedupe (similarity order)
//!                                        │
//!                                        ▼
//!                               Reranker ──► truncate(top_k)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mall_retrieval::{RetrievalConfig, Retriever};
//!
//! let retriever = Retriever::new(provider, index, RetrievalConfig::default());
//! let shops = retriever.retrieve("halal chinese food", 4).await?;
//! ```

pub mod config;
pub mod error;
pub mod rerank;
pub mod retriever;
pub mod text;

pub use config::RetrievalConfig;
pub use error::{Result, RetrievalError};
pub use rerank::{LexicalReranker, Reranker, SimilarityOrder};
pub use retriever::{RetrievalCandidate, Retriever};

// Re-export from dependencies for convenience
pub use mall_catalog::ShopRecord;
pub use mall_embeddings::{EmbeddingProvider, SemanticIndex};
