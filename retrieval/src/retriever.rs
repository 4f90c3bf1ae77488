//! The shop retriever.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;

use mall_catalog::ShopRecord;
use mall_embeddings::{EmbeddingError, EmbeddingProvider, EmbeddingRequest, SemanticIndex};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::error::{Result, RetrievalError};
use crate::rerank::{LexicalReranker, Reranker};

/// A shop returned by [`Retriever::retrieve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    /// Copy of the shop record.
    pub shop: ShopRecord,

    /// Cosine similarity reported by the index.
    pub similarity: f32,

    /// 1-based position in similarity order, before re-ranking.
    pub similarity_rank: usize,

    /// 1-based final position.
    pub rank: usize,

    /// Score assigned by the re-ranker, if it produced one.
    pub relevance: Option<f32>,
}

/// Embeds a query, searches the semantic index and re-ranks the results.
///
/// The retriever holds no mutable state; it can serve any number of
/// concurrent requests.
pub struct Retriever {
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn SemanticIndex>,
    reranker: Arc<dyn Reranker>,
    config: RetrievalConfig,
}

impl Retriever {
    /// Create a retriever using the lexical re-ranker.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn SemanticIndex>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            provider,
            index,
            reranker: Arc::new(LexicalReranker::default()),
            config,
        }
    }

    /// Replace the re-ranking policy.
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = reranker;
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve at most `top_k` distinct shops for `query`, best first.
    ///
    /// Fails with [`RetrievalError::RetrievalUnavailable`] rather than
    /// returning an empty list when the index cannot be searched.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalCandidate>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RetrievalError::InvalidQuery("query text is empty".to_string()));
        }
        if top_k == 0 {
            return Err(RetrievalError::InvalidQuery("top_k must be at least 1".to_string()));
        }

        let embedding = self.embed_query(query).await?;

        let fetch = self.config.fetch_count(top_k);
        let search = self.index.search(&embedding, fetch);
        let results = match timeout(self.config.search_timeout(), search).await {
            Ok(Ok(results)) => results,
            Ok(Err(e)) => return Err(RetrievalError::RetrievalUnavailable(e)),
            Err(_) => {
                return Err(RetrievalError::RetrievalUnavailable(EmbeddingError::Timeout(
                    self.config.search_timeout(),
                )));
            }
        };
        debug!("Index returned {} candidates (requested {fetch})", results.len());

        let mut decoded: Vec<(String, RetrievalCandidate)> = Vec::with_capacity(results.len());
        for result in results {
            if result.score < self.config.min_similarity {
                continue;
            }
            let shop = match result.metadata.map(serde_json::from_value::<ShopRecord>) {
                Some(Ok(shop)) => shop,
                Some(Err(e)) => {
                    warn!("Skipping {}: metadata is not a shop record: {e}", result.id);
                    continue;
                }
                None => {
                    warn!("Skipping {}: no metadata", result.id);
                    continue;
                }
            };
            let candidate = RetrievalCandidate {
                shop,
                similarity: result.score,
                similarity_rank: 0,
                rank: 0,
                relevance: None,
            };
            decoded.push((result.id, candidate));
        }

        // External indexes do not always honour the ordering contract. The
        // sort is stable, so the first copy of an id is its best-scoring one.
        decoded.sort_by_key(|(_, c)| Reverse(OrderedFloat(c.similarity)));
        let mut seen = HashSet::new();
        let mut candidates: Vec<RetrievalCandidate> = decoded
            .into_iter()
            .filter(|(id, _)| seen.insert(id.clone()))
            .map(|(_, candidate)| candidate)
            .collect();
        for (position, candidate) in candidates.iter_mut().enumerate() {
            candidate.similarity_rank = position + 1;
        }

        let mut ranked = self.reranker.rerank(query, candidates);
        ranked.truncate(top_k);
        for (position, candidate) in ranked.iter_mut().enumerate() {
            candidate.rank = position + 1;
        }

        debug!(
            "Retrieved {} shops with {} re-ranking: {:?}",
            ranked.len(),
            self.reranker.name(),
            ranked.iter().map(|c| c.shop.name.as_str()).collect::<Vec<_>>()
        );
        Ok(ranked)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest::new(query);
        match timeout(self.config.embed_timeout(), self.provider.embed(request)).await {
            Ok(Ok(response)) => Ok(response.embedding),
            Ok(Err(e)) => Err(RetrievalError::EmbeddingFailure(e)),
            Err(_) => Err(RetrievalError::EmbeddingFailure(EmbeddingError::Timeout(
                self.config.embed_timeout(),
            ))),
        }
    }
}
