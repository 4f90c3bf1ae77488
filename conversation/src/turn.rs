//! Conversation turns, exchanges and threads.

use std::fmt;

use chrono::{DateTime, Utc};
use mall_catalog::ShopRecord;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// Maximum accepted thread id length.
pub const MAX_THREAD_ID_LEN: usize = 128;

/// Caller-supplied identifier of one logical conversation.
///
/// Restricted to ASCII alphanumerics, `-` and `_` so it is safe to use as a
/// file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ThreadId(String);

impl ThreadId {
    /// Validate and wrap a thread id.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(StoreError::InvalidThreadId("thread id is empty".to_string()));
        }
        if raw.len() > MAX_THREAD_ID_LEN {
            return Err(StoreError::InvalidThreadId(format!(
                "thread id longer than {MAX_THREAD_ID_LEN} characters"
            )));
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(StoreError::InvalidThreadId(format!(
                "unexpected character {bad:?} in thread id"
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ThreadId {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<ThreadId> for String {
    fn from(value: ThreadId) -> Self {
        value.0
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message in a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Position within the thread, starting at 1, assigned by the store.
    pub sequence: u64,

    pub role: Role,

    pub content: String,

    /// Shared by the user turn and the assistant reply it produced.
    pub exchange_id: Uuid,

    pub created_at: DateTime<Utc>,

    /// Shops the assistant reply was grounded on, in rank order. Always
    /// empty on user turns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<ShopRecord>,
}

/// A completed user/assistant pair awaiting persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub exchange_id: Uuid,
    pub user: String,
    pub assistant: String,
    pub context: Vec<ShopRecord>,
    pub created_at: DateTime<Utc>,
}

impl Exchange {
    pub fn new(
        exchange_id: Uuid,
        user: impl Into<String>,
        assistant: impl Into<String>,
        context: Vec<ShopRecord>,
    ) -> Self {
        Self {
            exchange_id,
            user: user.into(),
            assistant: assistant.into(),
            context,
            created_at: Utc::now(),
        }
    }

    /// Materialize the two turns, numbered from `first_sequence`.
    pub fn into_turns(self, first_sequence: u64) -> [ConversationTurn; 2] {
        [
            ConversationTurn {
                sequence: first_sequence,
                role: Role::User,
                content: self.user,
                exchange_id: self.exchange_id,
                created_at: self.created_at,
                context: Vec::new(),
            },
            ConversationTurn {
                sequence: first_sequence + 1,
                role: Role::Assistant,
                content: self.assistant,
                exchange_id: self.exchange_id,
                created_at: self.created_at,
                context: self.context,
            },
        ]
    }
}

/// The full, append-only history of one thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationThread {
    pub id: ThreadId,
    pub turns: Vec<ConversationTurn>,
}

impl ConversationThread {
    /// A thread with no turns yet.
    pub fn new(id: ThreadId) -> Self {
        Self {
            id,
            turns: Vec::new(),
        }
    }

    /// Whether `exchange_id` has already been appended.
    pub fn contains_exchange(&self, exchange_id: Uuid) -> bool {
        self.turns.iter().any(|t| t.exchange_id == exchange_id)
    }

    /// Append both turns of `exchange` with the next sequence numbers.
    pub fn push_exchange(&mut self, exchange: Exchange) {
        let next = self.turns.last().map_or(1, |t| t.sequence + 1);
        self.turns.extend(exchange.into_turns(next));
    }

    /// Check that sequences strictly increase and every user turn is
    /// followed by the assistant turn of the same exchange.
    pub fn validate(&self) -> Result<()> {
        let corrupt = |reason: String| StoreError::Corrupt {
            thread_id: self.id.to_string(),
            reason,
        };

        for pair in self.turns.windows(2) {
            if pair[1].sequence <= pair[0].sequence {
                return Err(corrupt(format!(
                    "sequence {} follows {}",
                    pair[1].sequence, pair[0].sequence
                )));
            }
        }

        if self.turns.len() % 2 != 0 {
            return Err(corrupt("dangling turn without reply".to_string()));
        }
        for pair in self.turns.chunks(2) {
            if pair[0].role != Role::User
                || pair[1].role != Role::Assistant
                || pair[0].exchange_id != pair[1].exchange_id
            {
                return Err(corrupt(format!(
                    "turn {} is not a complete exchange",
                    pair[0].sequence
                )));
            }
        }
        Ok(())
    }
}
