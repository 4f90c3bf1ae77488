//! HTTP error mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mall_catalog::CatalogError;
use mall_engine::TurnError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Turn(#[from] TurnError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Turn(TurnError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            ApiError::Turn(err) if err.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Turn(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Catalog(
                CatalogError::InvalidRecord { .. } | CatalogError::Serialization(_),
            ) => StatusCode::BAD_REQUEST,
            ApiError::Catalog(CatalogError::Embedding(err)) if err.is_transient() => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Catalog(CatalogError::Embedding(_) | CatalogError::Io(_))
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed with {status}: {self}");
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mall_conversation::StoreError;
    use mall_embeddings::EmbeddingError;
    use mall_engine::GenerationError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ApiError::Turn(TurnError::InvalidInput("empty".to_string())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::Catalog(CatalogError::InvalidRecord {
                    position: 2,
                    reason: "missing title".to_string(),
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::Turn(GenerationError::Api("502 Bad Gateway".to_string()).into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ApiError::Turn(TurnError::ThreadStore(StoreError::Read("busy".to_string()))),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (ApiError::Turn(TurnError::Cancelled), StatusCode::INTERNAL_SERVER_ERROR),
            (
                ApiError::Turn(GenerationError::NotConfigured.into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::Catalog(EmbeddingError::RateLimited { retry_after_secs: 5 }.into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ApiError::Catalog(EmbeddingError::ProviderNotConfigured.into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.status(), expected, "{err}");
        }
    }
}
