//! Configuration for the shop retriever.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the shop retriever.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of shops returned when the caller does not choose.
    pub top_k: usize,

    /// How many times `top_k` to fetch from the index before re-ranking.
    pub overfetch_factor: usize,

    /// Candidates below this cosine similarity are dropped.
    pub min_similarity: f32,

    /// Deadline for embedding the query, in milliseconds.
    pub embed_timeout_ms: u64,

    /// Deadline for the index search, in milliseconds.
    pub search_timeout_ms: u64,
}

impl RetrievalConfig {
    /// Set the default number of results.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set the over-fetch factor.
    pub fn with_overfetch_factor(mut self, factor: usize) -> Self {
        self.overfetch_factor = factor;
        self
    }

    /// Set both service deadlines.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.embed_timeout_ms = millis;
        self.search_timeout_ms = millis;
        self
    }

    /// Number of candidates requested from the index for `top_k` results.
    pub fn fetch_count(&self, top_k: usize) -> usize {
        top_k.saturating_mul(self.overfetch_factor.max(1))
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            overfetch_factor: 2,
            min_similarity: -1.0,
            embed_timeout_ms: 10_000,
            search_timeout_ms: 5_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fetch_count_never_below_top_k() {
        let config = RetrievalConfig::default().with_overfetch_factor(0);
        assert_eq!(config.fetch_count(5), 5);
        assert_eq!(RetrievalConfig::default().fetch_count(5), 10);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: RetrievalConfig = serde_json::from_str(r#"{"top_k": 6}"#).unwrap();
        assert_eq!(config.top_k, 6);
        assert_eq!(config.overfetch_factor, 2);
    }
}
