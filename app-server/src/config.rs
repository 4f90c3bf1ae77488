//! Process configuration: command line, environment and an optional TOML file.

use std::path::{Path, PathBuf};

use clap::Parser;
use mall_engine::OrchestratorConfig;
use mall_retrieval::RetrievalConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "mall-app-server",
    about = "HTTP concierge that answers mall visitors from the shop catalog"
)]
pub struct Cli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "MALL_BIND", default_value = "127.0.0.1:8000")]
    pub bind: String,

    /// Directory holding thread files and catalog/index snapshots.
    #[arg(long, env = "MALL_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Directory for the rolling `app.log`; defaults to `<data-dir>/logs`.
    #[arg(long, env = "MALL_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Optional TOML file with `[orchestrator]` and `[retrieval]` tables.
    #[arg(long, env = "MALL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Base URL for OpenAI-compatible endpoints.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    /// Embedding model identifier.
    #[arg(long, env = "MALL_EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    pub embedding_model: String,

    /// Chat model identifier; overrides the config file when set.
    #[arg(long, env = "MALL_CHAT_MODEL")]
    pub chat_model: Option<String>,

    /// Seconds before an outbound OpenAI request is abandoned.
    #[arg(long, env = "MALL_OPENAI_TIMEOUT_SECS", default_value_t = 30)]
    pub openai_timeout_secs: u64,

    /// Max cached query embeddings kept in memory.
    #[arg(long, env = "MALL_EMBEDDING_CACHE", default_value_t = 1024)]
    pub embedding_cache_size: usize,
}

impl Cli {
    /// The data directory, falling back to the platform's local data dir.
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn resolved_log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| self.resolved_data_dir().join("logs"))
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("mall-concierge"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Library settings read from the TOML file. Every table is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub orchestrator: OrchestratorConfig,
    pub retrieval: RetrievalConfig,
}

impl FileConfig {
    pub fn from_toml(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml(path, &contents)
    }

    /// Load the file named on the command line, if any, and apply CLI
    /// overrides on top.
    pub async fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path).await?,
            None => Self::default(),
        };
        if let Some(model) = &cli.chat_model {
            config.orchestrator.model.model_name = model.clone();
        }
        Ok(config)
    }
}
