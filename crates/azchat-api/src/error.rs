//! Error types for azchat-api

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// azchat-api error type
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request body could not be used
    #[error("{0}")]
    InvalidRequest(String),

    /// An assistant run ended without an answer; the thread stays usable
    #[error("{error}")]
    RunFailed {
        error: String,
        status: String,
        thread_id: String,
    },

    #[error(transparent)]
    Core(#[from] azchat_core::Error),
}

/// JSON body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl ErrorResponse {
    fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            status: None,
            thread_id: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, ErrorResponse::message(msg)),
            ApiError::Core(e) if e.is_validation() => {
                (StatusCode::BAD_REQUEST, ErrorResponse::message(e.to_string()))
            }
            ApiError::Core(e) => {
                error!("Chat request failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::message(format!("{}: {}", e.kind(), e)),
                )
            }
            ApiError::RunFailed {
                error: msg,
                status: run_status,
                thread_id,
            } => {
                error!("Run on thread {} ended with {}: {}", thread_id, run_status, msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: msg,
                        status: Some(run_status),
                        thread_id: Some(thread_id),
                    },
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ApiError>;
