//! # Conversation State
//!
//! Ordered, append-only dialogue history keyed by thread:
//!
//! - **Turns**: user and assistant messages with store-assigned sequence numbers
//! - **Exchanges**: a user turn and its assistant reply, written as one update
//! - **Stores**: in-memory and JSON-file backends behind [`ThreadStore`]
//! - **Leases**: per-thread mutual exclusion around load-then-append
//!
//! ```text
//! Orchestrator ──lease──► ThreadStore ──load──► [turn 1, turn 2, ...]
//!                              │
//!                              └──append(Exchange)──► [..., user, assistant]
//! ```

pub mod error;
pub mod file;
pub mod lease;
pub mod memory;
pub mod store;
pub mod turn;

pub use error::{Result, StoreError};
pub use file::FileThreadStore;
pub use lease::{ThreadLease, ThreadLocks};
pub use memory::InMemoryThreadStore;
pub use store::{AppendAck, ThreadStore};
pub use turn::{ConversationThread, ConversationTurn, Exchange, Role, ThreadId};
