//! Shared server state and the on-disk layout of the data directory.
//!
//! ```text
//! <data-dir>/
//!   catalog.json     shop records
//!   index.json       embeddings + shop metadata
//!   threads/         one JSON file per conversation thread
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mall_catalog::{IngestReport, Ingestor, ShopCatalog, ShopRecord};
use mall_conversation::{FileThreadStore, ThreadStore};
use mall_embeddings::{
    CachedProvider, EmbeddingCache, EmbeddingProvider, OpenAIProvider, SimilarityIndex,
};
use mall_engine::{OpenAIChatClient, Orchestrator};
use mall_retrieval::Retriever;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::{Cli, FileConfig};
use crate::error::ApiError;

pub const CATALOG_FILE: &str = "catalog.json";
pub const INDEX_FILE: &str = "index.json";
pub const THREADS_DIR: &str = "threads";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    catalog: Arc<RwLock<ShopCatalog>>,
    index: Arc<RwLock<SimilarityIndex>>,
    ingestor: Arc<Ingestor>,
    snapshot_dir: Option<PathBuf>,
    push_lock: Arc<Mutex<()>>,
}

impl AppState {
    /// Assemble state from already-built parts. Snapshots are written to
    /// `snapshot_dir` after each push when it is set.
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        provider: Arc<dyn EmbeddingProvider>,
        index: Arc<RwLock<SimilarityIndex>>,
        catalog: ShopCatalog,
        snapshot_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            orchestrator,
            catalog: Arc::new(RwLock::new(catalog)),
            ingestor: Arc::new(Ingestor::new(provider, index.clone())),
            index,
            snapshot_dir,
            push_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Build the production stack: OpenAI clients, file-backed threads and
    /// the catalog/index snapshots found in the data directory.
    pub async fn open(cli: &Cli, config: FileConfig) -> anyhow::Result<Self> {
        let data_dir = cli.resolved_data_dir();
        fs::create_dir_all(&data_dir).await?;
        let timeout = Duration::from_secs(cli.openai_timeout_secs);

        let openai = OpenAIProvider::new()
            .with_base_url(&cli.openai_base_url)
            .with_model(&cli.embedding_model)
            .with_timeout(timeout)?;
        if !openai.is_available() {
            warn!("OPENAI_API_KEY is not set; retrieval and generation will fail");
        }
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(CachedProvider::new(
            openai,
            EmbeddingCache::new(cli.embedding_cache_size),
        ));
        let generator = Arc::new(
            OpenAIChatClient::new()
                .with_base_url(&cli.openai_base_url)
                .with_timeout(timeout)?,
        );

        let catalog = ShopCatalog::load(data_dir.join(CATALOG_FILE)).await?;
        let index = Arc::new(RwLock::new(
            load_index(&data_dir.join(INDEX_FILE), provider.default_dimension()).await?,
        ));

        let store: Arc<dyn ThreadStore> =
            Arc::new(FileThreadStore::open(data_dir.join(THREADS_DIR)).await?);
        let retriever = Arc::new(Retriever::new(
            provider.clone(),
            index.clone(),
            config.retrieval,
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            retriever,
            store,
            generator,
            config.orchestrator,
        ));

        let state = Self::new(orchestrator, provider, index, catalog, Some(data_dir));
        state.reconcile_index().await?;
        Ok(state)
    }

    /// Re-embed the catalog when the index snapshot is missing or stale.
    async fn reconcile_index(&self) -> anyhow::Result<()> {
        let records: Vec<ShopRecord> = {
            let catalog = self.catalog.read().await;
            let index = self.index.read().await;
            catalog
                .records()
                .filter(|record| index.get(&record.id).is_none())
                .cloned()
                .collect()
        };
        if records.is_empty() {
            return Ok(());
        }

        info!("Re-indexing {} shops missing from the index snapshot", records.len());
        self.ingestor.ingest(&records).await?;
        self.save_snapshots().await
    }

    /// Normalize, embed and store an uploaded batch of shops.
    ///
    /// The upload is rejected as a whole if any entry is invalid; nothing
    /// reaches the catalog unless every record was indexed.
    pub async fn push(&self, raw_json: &str) -> Result<IngestReport, ApiError> {
        let records = mall_catalog::parse_shops(raw_json)?;
        if records.is_empty() {
            return Err(ApiError::BadRequest("no shops in upload".to_string()));
        }

        let _guard = self.push_lock.lock().await;
        let report = self.ingestor.ingest(&records).await?;
        {
            let mut catalog = self.catalog.write().await;
            for record in records {
                catalog.upsert(record);
            }
        }
        self.save_snapshots()
            .await
            .map_err(|err| ApiError::Internal(format!("failed to save snapshots: {err}")))?;
        Ok(report)
    }

    pub async fn shop_count(&self) -> usize {
        self.catalog.read().await.len()
    }

    async fn save_snapshots(&self) -> anyhow::Result<()> {
        let Some(dir) = &self.snapshot_dir else {
            return Ok(());
        };

        self.catalog.read().await.save(dir.join(CATALOG_FILE)).await?;
        let json = self.index.read().await.to_json()?;
        let path = dir.join(INDEX_FILE);
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, json).await?;
        fs::rename(&temp_path, &path).await?;
        debug!("Saved catalog and index snapshots to {}", dir.display());
        Ok(())
    }
}

async fn load_index(path: &Path, dimension: usize) -> anyhow::Result<SimilarityIndex> {
    if !fs::try_exists(path).await? {
        debug!("No index snapshot at {}", path.display());
        return Ok(SimilarityIndex::new(dimension));
    }

    let json = fs::read_to_string(path).await?;
    match SimilarityIndex::from_json(&json, dimension) {
        Ok(index) => Ok(index),
        Err(err) => {
            warn!("Discarding index snapshot {}: {err}", path.display());
            Ok(SimilarityIndex::new(dimension))
        }
    }
}
