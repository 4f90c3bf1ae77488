//! Handlers driven directly with in-process collaborators.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{self, StatusCode, header};
use mall_app_server::AppState;
use mall_app_server::routes::{self, ChatRequest, DATA_FILE_FIELD, HistoryMessage};
use mall_app_server::state::{CATALOG_FILE, INDEX_FILE};
use mall_catalog::ShopCatalog;
use mall_conversation::{InMemoryThreadStore, ThreadStore};
use mall_embeddings::{
    EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, SimilarityIndex,
};
use mall_engine::{
    GenerationClient, GenerationError, ModelConfig, Orchestrator, OrchestratorConfig,
};
use mall_retrieval::{RetrievalConfig, Retriever};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio::sync::RwLock;

const VOCABULARY: &[&str] = &["halal", "chinese", "noodle", "coffee", "fashion"];

const SHOPS: &str = r#"[
    {"title": "Tang Noodle House", "venue": "LG1.03", "categories": ["Food & Beverage"],
     "keywords": ["halal", "noodle", "chinese"], "description": "Hand-pulled noodles."},
    {"title": "Kopi Corner", "venue": "G2.10", "categories": ["Food & Beverage"],
     "keywords": ["coffee"], "description": "Local coffee and toast."}
]"#;

struct KeywordProvider;

#[async_trait]
impl EmbeddingProvider for KeywordProvider {
    fn name(&self) -> &str {
        "keyword"
    }

    fn default_model(&self) -> &str {
        "keyword"
    }

    fn default_dimension(&self) -> usize {
        VOCABULARY.len() + 1
    }

    async fn embed(&self, request: EmbeddingRequest) -> mall_embeddings::Result<EmbeddingResponse> {
        let text = request.text.to_lowercase();
        let mut embedding: Vec<f32> = VOCABULARY
            .iter()
            .map(|word| if text.contains(word) { 1.0 } else { 0.0 })
            .collect();
        embedding.push(0.1);
        Ok(EmbeddingResponse {
            dimension: embedding.len(),
            embedding,
            model: "keyword".to_string(),
            tokens_used: None,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Recommends the first shop listed in the prompt context.
struct FirstShopGenerator;

#[async_trait]
impl GenerationClient for FirstShopGenerator {
    fn name(&self) -> &str {
        "first-shop"
    }

    async fn complete(
        &self,
        prompt: &str,
        _model: &ModelConfig,
    ) -> Result<String, GenerationError> {
        let shop = prompt
            .split("Context (stores of the mall):\n1. ")
            .nth(1)
            .and_then(|rest| rest.split(" | ").next())
            .unwrap_or("the concierge counter");
        let reply = serde_json::json!({"textResponse": format!("Try {shop}."), "shops": [shop]});
        Ok(reply.to_string())
    }
}

fn build_state(snapshot_dir: &TempDir) -> AppState {
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(KeywordProvider);
    let index = Arc::new(RwLock::new(SimilarityIndex::new(VOCABULARY.len() + 1)));
    let store: Arc<dyn ThreadStore> = Arc::new(InMemoryThreadStore::new());
    let retriever = Arc::new(Retriever::new(
        provider.clone(),
        index.clone(),
        RetrievalConfig::default().with_top_k(2),
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        retriever,
        store,
        Arc::new(FirstShopGenerator),
        OrchestratorConfig::default(),
    ));
    AppState::new(
        orchestrator,
        provider,
        index,
        ShopCatalog::new(),
        Some(snapshot_dir.path().to_path_buf()),
    )
}

/// The catalog as a raw request body.
fn json_upload(body: &str) -> Request {
    http::Request::post("/push")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// The catalog as a `multipart/form-data` file field.
fn form_upload(field: &str, body: &str) -> Request {
    let form = format!(
        "--mall-boundary\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"shops.json\"\r\n\
         Content-Type: application/json\r\n\r\n\
         {body}\r\n\
         --mall-boundary--\r\n"
    );
    http::Request::post("/push")
        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=mall-boundary")
        .body(Body::from(form))
        .unwrap()
}

fn chat_request(thread_id: &str, user_query: &str) -> Json<ChatRequest> {
    Json(ChatRequest {
        thread_id: thread_id.to_string(),
        user_query: user_query.to_string(),
    })
}

#[tokio::test]
async fn test_push_then_chat_then_history() {
    let dir = TempDir::new().unwrap();
    let state = build_state(&dir);

    let Json(pushed) = routes::push(State(state.clone()), json_upload(SHOPS))
        .await
        .unwrap();
    assert_eq!(pushed.status, "success");
    assert_eq!(pushed.records, 2);
    assert!(dir.path().join(CATALOG_FILE).exists());
    assert!(dir.path().join(INDEX_FILE).exists());

    let Json(reply) = routes::chat(
        State(state.clone()),
        chat_request("kiosk-7", "any halal noodle places?"),
    )
    .await
    .unwrap();
    assert_eq!(reply.response, "Try Tang Noodle House.");
    assert_eq!(reply.shops, vec!["Tang Noodle House"]);
    assert!(reply.persisted);
    assert_eq!(
        reply.history,
        vec![
            HistoryMessage {
                role: "user".to_string(),
                content: "any halal noodle places?".to_string(),
            },
            HistoryMessage {
                role: "assistant".to_string(),
                content: "Try Tang Noodle House.".to_string(),
            },
        ]
    );

    let Json(stored) = routes::history(State(state), Path("kiosk-7".to_string()))
        .await
        .unwrap();
    assert_eq!(stored.thread_id, "kiosk-7");
    assert_eq!(stored.history, reply.history);
}

#[tokio::test]
async fn test_push_snapshot_reloads() {
    let dir = TempDir::new().unwrap();
    let state = build_state(&dir);
    routes::push(State(state), json_upload(SHOPS)).await.unwrap();

    let catalog = ShopCatalog::load(dir.path().join(CATALOG_FILE)).await.unwrap();
    assert_eq!(catalog.len(), 2);
    assert!(catalog.get("Kopi Corner | G2.10").is_some());

    let json = std::fs::read_to_string(dir.path().join(INDEX_FILE)).unwrap();
    let index = SimilarityIndex::from_json(&json, VOCABULARY.len() + 1).unwrap();
    assert_eq!(index.len(), 2);
}

#[tokio::test]
async fn test_invalid_upload_is_rejected_whole() {
    let dir = TempDir::new().unwrap();
    let state = build_state(&dir);
    let upload = r#"[
        {"title": "Kopi Corner", "venue": "G2.10", "categories": [], "keywords": [],
         "description": ""},
        {"title": "  ", "venue": "G2.11", "categories": [], "keywords": [],
         "description": ""}
    ]"#;

    let err = routes::push(State(state.clone()), json_upload(upload))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    assert_eq!(state.shop_count().await, 0);
    assert!(!dir.path().join(CATALOG_FILE).exists());

    let err = routes::push(State(state), json_upload("not json"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_push_accepts_form_upload() {
    let dir = TempDir::new().unwrap();
    let state = build_state(&dir);

    let Json(pushed) = routes::push(State(state.clone()), form_upload(DATA_FILE_FIELD, SHOPS))
        .await
        .unwrap();
    assert_eq!(pushed.records, 2);
    assert_eq!(state.shop_count().await, 2);

    let err = routes::push(State(state), form_upload("other_file", SHOPS))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bad_chat_input_maps_to_400() {
    let dir = TempDir::new().unwrap();
    let state = build_state(&dir);

    let err = routes::chat(State(state.clone()), chat_request("kiosk-7", "   "))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);

    let err = routes::history(State(state), Path("../etc/passwd".to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_thread_has_empty_history() {
    let dir = TempDir::new().unwrap();
    let Json(stored) = routes::history(State(build_state(&dir)), Path("fresh".to_string()))
        .await
        .unwrap();
    assert!(stored.history.is_empty());
}

#[tokio::test]
async fn test_healthz() {
    assert_eq!(routes::healthz().await, StatusCode::OK);
}
