//! Application error model with HTTP response mapping
//!
//! Defines a typed error hierarchy using `thiserror` for internal error handling,
//! and maps each variant to the status code and JSON body the HTTP surface
//! promises its callers.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Application error type
///
/// Covers every failure a request can hit. Each variant maps to a stable HTTP
/// status code in [`IntoResponse`].
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid user input (missing field, malformed body, bad chat reference)
    #[error("{0}")]
    InvalidInput(String),
    /// Session was never authorized or the credential file is missing
    #[error("Not authenticated")]
    NotAuthenticated,
    /// Remote call failed (network, flood wait, unknown chat, call timeout)
    #[error("{0}")]
    Transport(String),
    /// Internal error (session file I/O, poisoned state, unexpected failure)
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Convenience constructor for `Transport`
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// HTTP status for this error
    ///
    /// # Mappings
    ///
    /// - `InvalidInput` → `400 Bad Request`
    /// - `NotAuthenticated` → `503 Service Unavailable`
    /// - `Transport` → `500 Internal Server Error`
    /// - `Internal` → `500 Internal Server Error`
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NotAuthenticated => StatusCode::SERVICE_UNAVAILABLE,
            Self::Transport(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::InvalidInput(_) | Self::NotAuthenticated => json!({ "error": self.to_string() }),
            Self::Transport(_) | Self::Internal(_) => {
                json!({ "success": false, "error": self.to_string() })
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Type alias for fallible return values
///
/// Use this for all internal functions that can fail. Provides a consistent
/// error type throughout the codebase.
pub type AppResult<T> = Result<T, AppError>;
