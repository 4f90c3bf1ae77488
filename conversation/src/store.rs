//! The thread store contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::lease::ThreadLease;
use crate::turn::{ConversationTurn, Exchange, ThreadId};

/// Outcome of [`ThreadStore::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendAck {
    /// Both turns were written.
    Appended,

    /// An exchange with the same id was already stored; nothing changed.
    AlreadyPresent,
}

/// Ordered per-thread conversation history.
///
/// Unknown threads load as empty history and are created by their first
/// append. Threads are never deleted through this interface.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Take the per-thread lease. Callers hold it across `load` and
    /// `append` so that concurrent turns on one thread cannot interleave.
    async fn lease(&self, thread_id: &ThreadId) -> ThreadLease;

    /// All turns of `thread_id` in sequence order.
    async fn load(&self, thread_id: &ThreadId) -> Result<Vec<ConversationTurn>>;

    /// Append both turns of `exchange` as one update.
    ///
    /// Sequence numbers continue from the last stored turn. Appending an
    /// exchange id that is already present is a no-op.
    async fn append(&self, thread_id: &ThreadId, exchange: Exchange) -> Result<AppendAck>;
}
