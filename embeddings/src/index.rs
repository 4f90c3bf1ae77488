//! In-memory index of shop embeddings.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::similarity::{SimilarityResult, find_top_k, normalize};

/// Nearest-neighbour search over embedded records.
///
/// Results come back ordered by descending cosine similarity (range
/// [-1, 1]), each carrying the record identifier and whatever metadata was
/// stored with it. Searching never mutates the index.
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Return at most `k` records closest to `query`.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SimilarityResult>>;
}

/// A stored vector. `embedding` is unit length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub embedding: Embedding,
    pub metadata: Option<serde_json::Value>,
}

/// On-disk form of a [`SimilarityIndex`].
#[derive(Serialize, Deserialize)]
struct Snapshot<E> {
    dimension: usize,
    entries: Vec<E>,
}

/// Exact cosine search over every stored vector.
///
/// Entries are keyed by id in a sorted map, so equal scores always come back
/// in id order.
#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    entries: BTreeMap<String, IndexEntry>,
    dimension: usize,
}

impl SimilarityIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            dimension,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn check(&self, len: usize) -> Result<()> {
        if len == self.dimension {
            Ok(())
        } else {
            Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: len,
            })
        }
    }

    /// Insert `embedding` under `id`, replacing any previous entry.
    pub fn add(
        &mut self,
        id: impl Into<String>,
        mut embedding: Embedding,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        self.check(embedding.len())?;
        normalize(&mut embedding);

        let id = id.into();
        let entry = IndexEntry {
            id: id.clone(),
            embedding,
            metadata,
        };
        if self.entries.insert(id.clone(), entry).is_some() {
            debug!("Replaced embedding {id}");
        }
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<IndexEntry> {
        self.entries.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `k` best entries scoring at least `min_score`, with their
    /// metadata attached.
    pub fn search(&self, query: &[f32], k: usize, min_score: f32) -> Result<Vec<SimilarityResult>> {
        self.check(query.len())?;
        let mut query = query.to_vec();
        normalize(&mut query);

        let scored = find_top_k(
            &query,
            self.entries.values().map(|e| (e.id.as_str(), e.embedding.as_slice())),
            k,
            min_score,
        )?;
        Ok(scored
            .into_iter()
            .map(|result| match self.entries.get(&result.id).and_then(|e| e.metadata.clone()) {
                Some(metadata) => result.with_metadata(metadata),
                None => result,
            })
            .collect())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&Snapshot {
            dimension: self.dimension,
            entries: self.entries.values().collect(),
        })?)
    }

    /// Restore a snapshot written by [`to_json`](Self::to_json). Fails when
    /// it was built for a different `dimension`.
    pub fn from_json(json: &str, dimension: usize) -> Result<Self> {
        let snapshot: Snapshot<IndexEntry> = serde_json::from_str(json)?;
        let mut index = Self::new(dimension);
        index.check(snapshot.dimension)?;
        for entry in snapshot.entries {
            index.check(entry.embedding.len())?;
            index.entries.insert(entry.id.clone(), entry);
        }

        info!("Loaded {} entries into similarity index", index.len());
        Ok(index)
    }
}

#[async_trait]
impl SemanticIndex for RwLock<SimilarityIndex> {
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SimilarityResult>> {
        self.read().await.search(query, k, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn food_court() -> SimilarityIndex {
        let mut index = SimilarityIndex::new(3);
        index
            .add("dim-sum", vec![1.0, 0.0, 0.0], Some(serde_json::json!({"name": "Dolly Dim Sum"})))
            .unwrap();
        index.add("sneakers", vec![0.0, 1.0, 0.0], None).unwrap();
        index.add("noodles", vec![0.7, 0.7, 0.0], None).unwrap();
        index
    }

    #[test]
    fn test_search_orders_by_similarity_and_attaches_metadata() {
        let results = food_court().search(&[1.0, 0.0, 0.0], 2, -1.0).unwrap();

        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["dim-sum", "noodles"]);
        assert_eq!(results[0].metadata, Some(serde_json::json!({"name": "Dolly Dim Sum"})));
        assert_eq!(results[1].metadata, None);
    }

    #[test]
    fn test_add_replaces_and_normalizes() {
        let mut index = food_court();
        index.add("dim-sum", vec![0.0, 0.0, 4.0], None).unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.get("dim-sum").unwrap().embedding, vec![0.0, 0.0, 1.0]);

        assert!(index.remove("dim-sum").is_some());
        assert!(index.remove("dim-sum").is_none());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = SimilarityIndex::new(3);
        assert!(index.add("bad", vec![1.0, 0.0], None).is_err());
        assert!(index.search(&[1.0], 1, -1.0).is_err());
    }

    #[test]
    fn test_snapshot_restores_entries() {
        let json = food_court().to_json().unwrap();
        let restored = SimilarityIndex::from_json(&json, 3).unwrap();

        assert_eq!(restored.len(), 3);
        assert!(restored.get("noodles").is_some());
        assert!(matches!(
            SimilarityIndex::from_json(&json, 4),
            Err(EmbeddingError::DimensionMismatch { expected: 4, actual: 3 })
        ));
    }

    #[tokio::test]
    async fn test_shared_index_search() {
        let shared = RwLock::new(food_court());
        let results = SemanticIndex::search(&shared, &[0.0, 1.0, 0.0], 5).await.unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, "sneakers");
    }
}
