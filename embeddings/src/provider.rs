//! Embedding providers.
//!
//! The catalog and the retriever both talk to an [`EmbeddingProvider`]; the
//! production implementation is the OpenAI embeddings endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_DEFAULT_MODEL: &str = "text-embedding-3-small";

/// One text to embed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// Text to embed.
    pub text: String,

    /// Provider model; the provider's default when unset.
    pub model: Option<String>,

    /// Requested output size, for models that can shorten their vectors.
    pub dimensions: Option<usize>,
}

impl EmbeddingRequest {
    /// Create a request for `text` using the provider defaults.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            dimensions: None,
        }
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the output dimensions.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

/// A computed embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// The vector, as returned by the provider.
    pub embedding: Embedding,

    /// Model that actually produced the vector.
    pub model: String,

    /// Length of `embedding`.
    pub dimension: usize,

    /// Tokens billed for the request, when the provider reports it.
    pub tokens_used: Option<u64>,
}

/// Turns text into vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Model used when a request does not name one.
    fn default_model(&self) -> &str;

    /// Vector size produced by [`default_model`](Self::default_model).
    fn default_dimension(&self) -> usize;

    /// Embed a single text.
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse>;

    /// Embed several texts; responses are in request order. The default
    /// issues one call per request.
    async fn embed_batch(&self, requests: Vec<EmbeddingRequest>) -> Result<Vec<EmbeddingResponse>> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.embed(request).await?);
        }
        Ok(results)
    }

    /// Whether the provider has what it needs to make calls.
    fn is_available(&self) -> bool;
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
///
/// Batches go out as a single request with an array `input`.
pub struct OpenAIProvider {
    /// API key.
    api_key: Option<String>,

    /// API base URL, without a trailing slash.
    base_url: String,

    /// HTTP client.
    client: reqwest::Client,

    /// Model for requests that do not name one.
    default_model: String,
}

impl OpenAIProvider {
    /// Provider for the public API, keyed from `OPENAI_API_KEY`.
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            base_url: OPENAI_BASE_URL.to_string(),
            client: reqwest::Client::new(),
            default_model: OPENAI_DEFAULT_MODEL.to_string(),
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the default model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Bound every HTTP request made by this provider.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    /// Embed `inputs` with one API call and return the vectors in input
    /// order.
    async fn request(
        &self,
        inputs: Vec<&str>,
        model: &str,
        dimensions: Option<usize>,
    ) -> Result<Vec<EmbeddingResponse>> {
        let api_key = self.api_key.as_ref().ok_or(EmbeddingError::ProviderNotConfigured)?;
        let expected = inputs.len();
        debug!("Embedding {expected} texts with {model}");

        let body = wire::Request {
            input: inputs,
            model,
            dimensions,
        };
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(EmbeddingError::RateLimited {
                retry_after_secs: retry_after_secs(response.headers()),
            });
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiRequest(format!("{status}: {detail}")));
        }

        let mut parsed: wire::Response = response.json().await?;
        if parsed.data.len() != expected {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {expected} embeddings, got {}",
                parsed.data.len()
            )));
        }

        // Items may arrive out of order; `index` is authoritative.
        parsed.data.sort_by_key(|item| item.index);
        let tokens_used = parsed.usage.map(|u| u.total_tokens).filter(|_| expected == 1);
        Ok(parsed
            .data
            .into_iter()
            .map(|item| EmbeddingResponse {
                dimension: item.embedding.len(),
                embedding: item.embedding,
                model: parsed.model.clone(),
                tokens_used,
            })
            .collect())
    }
}

impl Default for OpenAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn default_dimension(&self) -> usize {
        dimension_for_model(&self.default_model)
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let model = request.model.as_deref().unwrap_or(&self.default_model);
        self.request(vec![request.text.as_str()], model, request.dimensions)
            .await?
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding in response".to_string()))
    }

    async fn embed_batch(&self, requests: Vec<EmbeddingRequest>) -> Result<Vec<EmbeddingResponse>> {
        let Some(first) = requests.first() else {
            return Ok(Vec::new());
        };
        let model = first.model.as_deref().unwrap_or(&self.default_model);
        let texts = requests.iter().map(|r| r.text.as_str()).collect();
        self.request(texts, model, first.dimensions).await
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

fn dimension_for_model(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => crate::DEFAULT_DIMENSION,
    }
}

fn retry_after_secs(headers: &HeaderMap) -> u64 {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(60)
}

mod wire {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize)]
    pub(super) struct Request<'a> {
        pub input: Vec<&'a str>,
        pub model: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub dimensions: Option<usize>,
    }

    #[derive(Deserialize)]
    pub(super) struct Response {
        pub data: Vec<Item>,
        pub model: String,
        pub usage: Option<Usage>,
    }

    #[derive(Deserialize)]
    pub(super) struct Item {
        pub embedding: Vec<f32>,
        pub index: usize,
    }

    #[derive(Deserialize)]
    pub(super) struct Usage {
        pub total_tokens: u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> OpenAIProvider {
        OpenAIProvider::new()
            .with_api_key("test-key")
            .with_base_url(server.uri())
    }

    #[test]
    fn test_large_model_dimension() {
        let provider = OpenAIProvider::new().with_model("text-embedding-3-large");
        assert_eq!(provider.default_dimension(), 3072);
        assert_eq!(OpenAIProvider::new().default_dimension(), crate::DEFAULT_DIMENSION);
    }

    #[tokio::test]
    async fn test_single_embed_reports_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "input": ["halal dim sum"],
                "model": "text-embedding-3-small",
                "dimensions": 2
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.6, 0.8], "index": 0}],
                "model": "text-embedding-3-small",
                "usage": {"prompt_tokens": 3, "total_tokens": 3}
            })))
            .mount(&server)
            .await;

        let response = provider(&server)
            .embed(EmbeddingRequest::new("halal dim sum").with_dimensions(2))
            .await
            .unwrap();

        assert_eq!(response.embedding, vec![0.6, 0.8]);
        assert_eq!(response.dimension, 2);
        assert_eq!(response.tokens_used, Some(3));
    }

    #[tokio::test]
    async fn test_embed_batch_restores_input_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"embedding": [0.0, 1.0], "index": 1},
                    {"embedding": [1.0, 0.0], "index": 0}
                ],
                "model": "text-embedding-3-small",
                "usage": {"prompt_tokens": 4, "total_tokens": 4}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let responses = provider(&server)
            .embed_batch(vec![EmbeddingRequest::new("dim sum"), EmbeddingRequest::new("sneakers")])
            .await
            .unwrap();

        assert_eq!(responses[0].embedding, vec![1.0, 0.0]);
        assert_eq!(responses[1].embedding, vec![0.0, 1.0]);
        assert_eq!(responses[0].tokens_used, None);
    }

    #[tokio::test]
    async fn test_short_batch_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [1.0, 0.0], "index": 0}],
                "model": "text-embedding-3-small"
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .embed_batch(vec![EmbeddingRequest::new("a"), EmbeddingRequest::new("b")])
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_rate_limit_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .embed(EmbeddingRequest::new("coffee"))
            .await
            .unwrap_err();

        assert!(matches!(err, EmbeddingError::RateLimited { retry_after_secs: 7 }));
    }

    #[tokio::test]
    async fn test_server_error_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .embed(EmbeddingRequest::new("coffee"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::ApiRequest(ref m) if m.contains("500") && m.contains("upstream down")
        ));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let provider = OpenAIProvider {
            api_key: None,
            base_url: "http://localhost".to_string(),
            client: reqwest::Client::new(),
            default_model: OPENAI_DEFAULT_MODEL.to_string(),
        };
        assert!(!provider.is_available());
        let err = provider
            .embed(EmbeddingRequest::new("coffee"))
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::ProviderNotConfigured));
    }
}
