//! Query embedding cache.

use std::num::NonZeroUsize;

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::debug;

use crate::Embedding;
use crate::error::Result;
use crate::provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    model: String,
    text: String,
}

impl CacheKey {
    fn new(text: &str, model: &str) -> Self {
        Self {
            model: model.to_string(),
            text: text.to_string(),
        }
    }
}

/// Bounded least-recently-used cache of query embeddings keyed by
/// (text, model).
pub struct EmbeddingCache {
    /// `None` when caching is disabled.
    vectors: Option<Mutex<LruCache<CacheKey, Embedding>>>,
}

impl EmbeddingCache {
    /// `capacity == 0` disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            vectors: NonZeroUsize::new(capacity)
                .map(|capacity| Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Look up a vector, marking it most recently used.
    pub async fn get(&self, text: &str, model: &str) -> Option<Embedding> {
        let vectors = self.vectors.as_ref()?;
        vectors.lock().await.get(&CacheKey::new(text, model)).cloned()
    }

    pub async fn put(&self, text: &str, model: &str, embedding: Embedding) {
        if let Some(vectors) = &self.vectors {
            vectors.lock().await.put(CacheKey::new(text, model), embedding);
        }
    }

    pub async fn len(&self) -> usize {
        match &self.vectors {
            Some(vectors) => vectors.lock().await.len(),
            None => 0,
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// A provider wrapper that serves repeated texts from an [`EmbeddingCache`].
pub struct CachedProvider<P> {
    provider: P,
    cache: EmbeddingCache,
}

impl<P> CachedProvider<P>
where
    P: EmbeddingProvider,
{
    pub fn new(provider: P, cache: EmbeddingCache) -> Self {
        Self { provider, cache }
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }
}

#[async_trait]
impl<P> EmbeddingProvider for CachedProvider<P>
where
    P: EmbeddingProvider,
{
    fn name(&self) -> &str {
        self.provider.name()
    }

    fn default_model(&self) -> &str {
        self.provider.default_model()
    }

    fn default_dimension(&self) -> usize {
        self.provider.default_dimension()
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string());

        if let Some(embedding) = self.cache.get(&request.text, &model).await {
            debug!("Embedding cache hit ({model})");
            return Ok(EmbeddingResponse {
                dimension: embedding.len(),
                embedding,
                model,
                tokens_used: None,
            });
        }

        let text = request.text.clone();
        let response = self.provider.embed(request).await?;
        self.cache
            .put(&text, &model, response.embedding.clone())
            .await;

        Ok(response)
    }

    async fn embed_batch(&self, requests: Vec<EmbeddingRequest>) -> Result<Vec<EmbeddingResponse>> {
        // Batches come from ingestion and are not worth caching.
        self.provider.embed_batch(requests).await
    }

    fn is_available(&self) -> bool {
        self.provider.is_available()
    }
}
