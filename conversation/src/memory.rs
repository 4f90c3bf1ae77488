//! In-process thread store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::lease::{ThreadLease, ThreadLocks};
use crate::store::{AppendAck, ThreadStore};
use crate::turn::{ConversationThread, ConversationTurn, Exchange, ThreadId};

/// Keeps every thread in memory. History is lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryThreadStore {
    threads: RwLock<HashMap<ThreadId, ConversationThread>>,
    locks: ThreadLocks,
}

impl InMemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of threads with at least one exchange.
    pub async fn thread_count(&self) -> usize {
        self.threads.read().await.len()
    }
}

#[async_trait]
impl ThreadStore for InMemoryThreadStore {
    async fn lease(&self, thread_id: &ThreadId) -> ThreadLease {
        self.locks.acquire(thread_id).await
    }

    async fn load(&self, thread_id: &ThreadId) -> Result<Vec<ConversationTurn>> {
        Ok(self
            .threads
            .read()
            .await
            .get(thread_id)
            .map(|t| t.turns.clone())
            .unwrap_or_default())
    }

    async fn append(&self, thread_id: &ThreadId, exchange: Exchange) -> Result<AppendAck> {
        let mut threads = self.threads.write().await;
        let thread = threads
            .entry(thread_id.clone())
            .or_insert_with(|| ConversationThread::new(thread_id.clone()));

        if thread.contains_exchange(exchange.exchange_id) {
            debug!("Exchange {} already stored on {thread_id}", exchange.exchange_id);
            return Ok(AppendAck::AlreadyPresent);
        }
        thread.push_exchange(exchange);
        Ok(AppendAck::Appended)
    }
}
