//! # Turn Orchestration
//!
//! The conversational core: one [`Orchestrator::run_turn`] call per visitor
//! message.
//!
//! ```text
//! TurnRequest
//!     │
//!     ├─ lease + load history ────────────── ThreadStore
//!     ├─ RetrievalPolicy::decide
//!     │     ├─ NeedsRetrieval ─► Retriever::retrieve
//!     │     └─ ReuseContext ──► shops from the last grounded reply
//!     ├─ PromptEnvelope::render
//!     ├─ GenerationClient::complete (bounded, with deadline)
//!     └─ ThreadStore::append(Exchange) ─► TurnOutcome
//! ```
//!
//! A failed retrieval or generation aborts the turn with nothing written.
//! A failed append after a successful generation still returns the reply,
//! flagged [`Persistence::Unpersisted`].

pub mod config;
pub mod error;
pub mod generation;
pub mod orchestrator;
pub mod policy;
pub mod prompt;
pub mod reply;

pub use config::OrchestratorConfig;
pub use error::{FailureCause, GenerationError, Result, TurnError};
pub use generation::{GenerationClient, ModelConfig, OpenAIChatClient};
pub use orchestrator::{
    Orchestrator, Persistence, TurnContext, TurnOutcome, TurnOverrides, TurnPhase, TurnRequest,
    TurnState,
};
pub use policy::{AlwaysRetrieve, HeuristicPolicy, RetrievalDecision, RetrievalPolicy};
pub use prompt::{DEFAULT_PERSONA, NO_HISTORY_MARKER, PromptEnvelope};
pub use reply::AssistantReply;

// Re-export from dependencies for convenience
pub use tokio_util::sync::CancellationToken;
