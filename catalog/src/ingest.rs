//! Loading shops into the semantic index.

use std::sync::Arc;

use mall_embeddings::{EmbeddingError, EmbeddingProvider, EmbeddingRequest, SimilarityIndex};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::Result;
use crate::record::ShopRecord;

/// Summary of an ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Records handed to the ingestor.
    pub records: usize,

    /// Records embedded and written to the index.
    pub embedded: usize,

    /// Embedding requests issued.
    pub batches: usize,
}

/// Embeds shops in batches and upserts them into a shared index.
///
/// Each index entry carries the serialized [`ShopRecord`] as metadata so
/// that search results can be turned back into shops without a second
/// lookup. A batch is only written once every embedding in it succeeded.
pub struct Ingestor {
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<RwLock<SimilarityIndex>>,
    batch_size: usize,
}

impl Ingestor {
    /// Create an ingestor with the default batch size of 64.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, index: Arc<RwLock<SimilarityIndex>>) -> Self {
        Self {
            provider,
            index,
            batch_size: 64,
        }
    }

    /// Set how many records are embedded per request.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Embed and index `records`.
    pub async fn ingest(&self, records: &[ShopRecord]) -> Result<IngestReport> {
        let mut report = IngestReport {
            records: records.len(),
            ..Default::default()
        };

        for batch in records.chunks(self.batch_size) {
            let requests = batch
                .iter()
                .map(|record| EmbeddingRequest::new(record.embedding_text()))
                .collect();
            let responses = self.provider.embed_batch(requests).await?;
            report.batches += 1;
            if responses.len() != batch.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    responses.len()
                ))
                .into());
            }

            let mut entries = Vec::with_capacity(batch.len());
            for (record, response) in batch.iter().zip(responses) {
                let metadata = serde_json::to_value(record)?;
                entries.push((record.id.clone(), response.embedding, metadata));
            }

            let mut index = self.index.write().await;
            let expected = index.dimension();
            if let Some((_, embedding, _)) = entries.iter().find(|(_, e, _)| e.len() != expected) {
                return Err(EmbeddingError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                }
                .into());
            }
            for (id, embedding, metadata) in entries {
                index.add(id, embedding, Some(metadata))?;
                report.embedded += 1;
            }
            debug!("Indexed batch of {} shops", batch.len());
        }

        info!(
            "Ingested {} shops in {} batches",
            report.embedded, report.batches
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::parse_shops;
    use async_trait::async_trait;
    use mall_embeddings::EmbeddingResponse;
    use pretty_assertions::assert_eq;

    struct LengthProvider {
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for LengthProvider {
        fn name(&self) -> &str {
            "length"
        }

        fn default_model(&self) -> &str {
            "length"
        }

        fn default_dimension(&self) -> usize {
            2
        }

        async fn embed(
            &self,
            request: EmbeddingRequest,
        ) -> mall_embeddings::Result<EmbeddingResponse> {
            if self.fail {
                return Err(EmbeddingError::ApiRequest("down".to_string()));
            }
            Ok(EmbeddingResponse {
                embedding: vec![request.text.len() as f32, 1.0],
                model: "length".to_string(),
                dimension: 2,
                tokens_used: None,
            })
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    fn records() -> Vec<ShopRecord> {
        parse_shops(
            r#"[
                {"title": "Dolly Dim Sum", "venue": "LG2.12"},
                {"title": "Uniqlo", "venue": "G1.05"},
                {"title": "Sushi King", "venue": "LG1.20"}
            ]"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_ingest_stores_records_as_metadata() {
        let index = Arc::new(RwLock::new(SimilarityIndex::new(2)));
        let ingestor = Ingestor::new(Arc::new(LengthProvider { fail: false }), index.clone())
            .with_batch_size(2);

        let report = ingestor.ingest(&records()).await.unwrap();

        assert_eq!(
            report,
            IngestReport {
                records: 3,
                embedded: 3,
                batches: 2
            }
        );
        let index = index.read().await;
        let entry = index.get("Uniqlo | G1.05").unwrap();
        let stored: ShopRecord =
            serde_json::from_value(entry.metadata.clone().unwrap()).unwrap();
        assert_eq!(stored.name, "Uniqlo");
    }

    #[tokio::test]
    async fn test_failed_embedding_writes_nothing() {
        let index = Arc::new(RwLock::new(SimilarityIndex::new(2)));
        let ingestor = Ingestor::new(Arc::new(LengthProvider { fail: true }), index.clone());

        assert!(ingestor.ingest(&records()).await.is_err());
        assert!(index.read().await.is_empty());
    }
}
