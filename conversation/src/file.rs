//! JSON-file thread store.
//!
//! Each thread lives in `{root}/{thread_id}.json`. Every append rewrites
//! the file through a temp file and a rename, so after a crash the file
//! holds either the previous history or the history including the whole
//! new exchange.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::lease::{ThreadLease, ThreadLocks};
use crate::store::{AppendAck, ThreadStore};
use crate::turn::{ConversationThread, ConversationTurn, Exchange, ThreadId};

/// Thread store backed by one JSON file per thread.
#[derive(Debug)]
pub struct FileThreadStore {
    root: PathBuf,

    /// Leases handed to callers.
    leases: ThreadLocks,

    /// Serializes the read-modify-write inside `append`.
    writes: ThreadLocks,
}

impl FileThreadStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| StoreError::Write(format!("{}: {e}", root.display())))?;

        info!("Thread store at {}", root.display());
        Ok(Self {
            root,
            leases: ThreadLocks::new(),
            writes: ThreadLocks::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn thread_path(&self, thread_id: &ThreadId) -> PathBuf {
        self.root.join(format!("{thread_id}.json"))
    }

    async fn read_thread(&self, thread_id: &ThreadId) -> Result<ConversationThread> {
        let path = self.thread_path(thread_id);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ConversationThread::new(thread_id.clone()));
            }
            Err(e) => return Err(StoreError::Read(format!("{}: {e}", path.display()))),
        };

        let thread: ConversationThread =
            serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
                thread_id: thread_id.to_string(),
                reason: e.to_string(),
            })?;
        if &thread.id != thread_id {
            return Err(StoreError::Corrupt {
                thread_id: thread_id.to_string(),
                reason: format!("file belongs to thread {}", thread.id),
            });
        }
        thread.validate()?;
        Ok(thread)
    }

    async fn write_thread(&self, thread: &ConversationThread) -> Result<()> {
        let path = self.thread_path(&thread.id);
        let content = serde_json::to_string_pretty(thread)?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &content)
            .await
            .map_err(|e| StoreError::Write(format!("{}: {e}", temp_path.display())))?;
        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| StoreError::Write(format!("{}: {e}", path.display())))?;

        debug!("Saved {} turns of thread {}", thread.turns.len(), thread.id);
        Ok(())
    }
}

#[async_trait]
impl ThreadStore for FileThreadStore {
    async fn lease(&self, thread_id: &ThreadId) -> ThreadLease {
        self.leases.acquire(thread_id).await
    }

    async fn load(&self, thread_id: &ThreadId) -> Result<Vec<ConversationTurn>> {
        Ok(self.read_thread(thread_id).await?.turns)
    }

    async fn append(&self, thread_id: &ThreadId, exchange: Exchange) -> Result<AppendAck> {
        let _write = self.writes.acquire(thread_id).await;

        let mut thread = self.read_thread(thread_id).await?;
        if thread.contains_exchange(exchange.exchange_id) {
            debug!("Exchange {} already stored on {thread_id}", exchange.exchange_id);
            return Ok(AppendAck::AlreadyPresent);
        }
        thread.push_exchange(exchange);
        self.write_thread(&thread).await?;
        Ok(AppendAck::Appended)
    }
}
