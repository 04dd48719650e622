//! Unified API error type with Axum `IntoResponse` support.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cq_engine::EngineError;
use cq_store::StoreError;
use serde_json::json;

/// API error type that converts to proper HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownTable(t) => Self::NotFound(format!("table '{t}' not found")),
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::Io(msg) => Self::Internal(msg),
            other => Self::BadRequest(other.to_string()),
        }
    }
}

fn engine_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::ClassificationAmbiguous { .. }
        | EngineError::ExtractionIncomplete { .. }
        | EngineError::ExtractionAmbiguous { .. }
        | EngineError::CompileTypeMismatch { .. }
        | EngineError::CompileUnknownReference { .. }
        | EngineError::CompileInvalid { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::ValidationRejected { .. } => StatusCode::FORBIDDEN,
        EngineError::ValidationNeedsConfirmation { .. } | EngineError::SourceMismatch(_) => {
            StatusCode::CONFLICT
        }
        EngineError::ConfirmationUnknown(_) => StatusCode::NOT_FOUND,
        EngineError::ConfirmationExpired(_) => StatusCode::GONE,
        EngineError::Schema(_) => StatusCode::BAD_REQUEST,
        EngineError::Execution(_) | EngineError::Audit(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::Engine(err) => (engine_status(err), err.to_string()),
        };

        let mut body = json!({
            "error": message,
            "status": status.as_u16(),
        });

        // Engine failures carry enough context to rephrase or confirm.
        if let ApiError::Engine(err) = &self {
            body["kind"] = json!(err.kind());
            body["stage"] = json!(err.stage());
            if let Some(intent) = err.intent() {
                body["intent"] = json!(intent);
            }
            if let Some(params) = err.params() {
                body["params"] = json!(params);
            }
            match err {
                EngineError::ValidationRejected { plan: Some(plan), .. } => {
                    body["plan"] = json!(plan);
                }
                EngineError::ExtractionAmbiguous { candidates, .. } => {
                    body["candidates"] = json!(candidates);
                }
                EngineError::ExtractionIncomplete { missing, .. } => {
                    body["missing"] = json!(missing);
                }
                _ => {}
            }
        }

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "request failed");
        }

        (status, axum::Json(body)).into_response()
    }
}

/// Convenience alias.
pub type ApiResult<T> = Result<T, ApiError>;
