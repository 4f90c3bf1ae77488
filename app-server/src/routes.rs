//! HTTP routes.

use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use mall_conversation::ConversationTurn;
use mall_engine::TurnRequest;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// Form field carrying the catalog file in a multipart upload.
pub const DATA_FILE_FIELD: &str = "data_file";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/chat", post(chat))
        .route("/history/{thread_id}", get(history))
        .route("/push", post(push))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub thread_id: String,
    pub user_query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

impl From<&ConversationTurn> for HistoryMessage {
    fn from(turn: &ConversationTurn) -> Self {
        Self {
            role: turn.role.label().to_string(),
            content: turn.content.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub shops: Vec<String>,
    pub history: Vec<HistoryMessage>,
    pub persisted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub thread_id: String,
    pub history: Vec<HistoryMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PushResponse {
    pub status: String,
    pub message: String,
    pub records: usize,
}

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let outcome = state
        .orchestrator
        .run_turn(TurnRequest::new(request.thread_id, request.user_query))
        .await?;

    Ok(Json(ChatResponse {
        response: outcome.reply.text,
        shops: outcome.reply.shops,
        history: outcome.history.iter().map(HistoryMessage::from).collect(),
        persisted: outcome.persistence.is_persisted(),
    }))
}

pub async fn history(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let turns = state.orchestrator.history(&thread_id).await?;
    Ok(Json(HistoryResponse {
        thread_id,
        history: turns.iter().map(HistoryMessage::from).collect(),
    }))
}

/// Replace the catalog with an uploaded JSON array of shops.
///
/// The array is either the raw request body or the `data_file` field of a
/// `multipart/form-data` upload.
pub async fn push(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<PushResponse>, ApiError> {
    let body = if is_multipart(request.headers()) {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        read_data_file(multipart).await?
    } else {
        String::from_request(request, &state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?
    };

    let report = state.push(&body).await?;
    let total = state.shop_count().await;
    info!("Push ingested {} shops; catalog holds {total}", report.embedded);

    Ok(Json(PushResponse {
        status: "success".to_string(),
        message: format!(
            "Ingested {} shops; the catalog now holds {total}.",
            report.embedded
        ),
        records: report.embedded,
    }))
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"))
}

async fn read_data_file(mut multipart: Multipart) -> Result<String, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() == Some(DATA_FILE_FIELD) {
            return field
                .text()
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()));
        }
    }
    Err(ApiError::BadRequest(format!(
        "multipart upload has no `{DATA_FILE_FIELD}` field"
    )))
}
