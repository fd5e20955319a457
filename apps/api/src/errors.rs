use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::extraction::{ErrorKind, ParseFailure};

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Parse(Box<ParseFailure>),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ParseFailure> for AppError {
    fn from(failure: ParseFailure) -> Self {
        AppError::Parse(Box::new(failure))
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(err.body_text())
        } else {
            AppError::BadRequest(err.body_text())
        }
    }
}

/// Locked documents and uploads nothing can read get their own status codes;
/// every other exhausted parse is a 422.
fn parse_status(failure: &ParseFailure) -> (StatusCode, &'static str) {
    if failure.has_kind(ErrorKind::PasswordProtected) {
        return (StatusCode::LOCKED, "DOCUMENT_LOCKED");
    }
    if !failure.errors.is_empty() && failure.errors.iter().all(|e| e.kind == ErrorKind::UnsupportedType) {
        return (StatusCode::UNSUPPORTED_MEDIA_TYPE, "UNSUPPORTED_MEDIA_TYPE");
    }
    (StatusCode::UNPROCESSABLE_ENTITY, "PARSE_FAILED")
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), None),
            AppError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg.clone(), None)
            }
            AppError::Parse(failure) => {
                let (status, code) = parse_status(failure);
                let message = failure
                    .primary()
                    .map(|e| e.message.clone())
                    .unwrap_or_else(|| failure.to_string());
                let details = json!({
                    "document_id": failure.document_id,
                    "attempted": failure.attempted,
                    "errors": failure.errors,
                    "progress": failure.progress,
                });
                (status, code, message, Some(details))
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                    None,
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let Some(details) = details {
            error["details"] = details;
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}
