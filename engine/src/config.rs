//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::generation::ModelConfig;
use crate::prompt::DEFAULT_PERSONA;

/// Configuration for the [`Orchestrator`](crate::Orchestrator).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Number of most recent turns included in the prompt. The stored
    /// history is never truncated.
    pub history_window: usize,

    /// Shops retrieved per turn; the retriever's own default when unset.
    pub top_k: Option<usize>,

    /// Deadline for one generation call, in milliseconds.
    pub generation_timeout_ms: u64,

    /// Generation calls allowed in flight across all threads.
    pub max_concurrent_generations: usize,

    /// Model options used when a request does not override them.
    pub model: ModelConfig,

    /// System instructions placed at the top of every prompt.
    pub persona: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            history_window: 10,
            top_k: None,
            generation_timeout_ms: 30_000,
            max_concurrent_generations: 8,
            model: ModelConfig::default(),
            persona: DEFAULT_PERSONA.to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_history_window(mut self, turns: usize) -> Self {
        self.history_window = turns;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_concurrent_generations(mut self, limit: usize) -> Self {
        self.max_concurrent_generations = limit;
        self
    }

    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.model = model;
        self
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }
}
