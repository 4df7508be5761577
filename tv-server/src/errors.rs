//! `AppError`/`AppResult`: the HTTP-facing error boundary (spec.md/SPEC_FULL.md §7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;
use tv_core::EngineError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn request_timeout(message: impl Into<String>) -> Self {
        Self::new(StatusCode::REQUEST_TIMEOUT, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
            }
        }));
        (self.status, body).into_response()
    }
}

/// Mirrors `ferrex-server/src/errors.rs`'s `From<MediaError>` impl: every *kind* from spec.md §7
/// maps to exactly one status code. Parse-line errors never reach here — they are data
/// (`tv_model::ParseError`) carried inside a `ParseSession`, not an `EngineError` variant.
impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound { .. } => Self::not_found(err.to_string()),
            EngineError::Locked(_) => Self::conflict(err.to_string()),
            EngineError::InvalidInput(_) => Self::bad_request(err.to_string()),
            EngineError::Cancelled => Self::request_timeout(err.to_string()),
            EngineError::Io(_) | EngineError::Store(_) | EngineError::Integrity(_) | EngineError::ParseFatal(_) | EngineError::Internal(_) => {
                Self::internal(err.to_string())
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}
