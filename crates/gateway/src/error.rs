//! Gateway error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use pico_plugins::PluginError;
use serde::Serialize;
use thiserror::Error;

/// Failures starting or running the HTTP server.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// An error returned to an HTTP client as `{ "error": ... }`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<PluginError> for ApiError {
    fn from(err: PluginError) -> Self {
        match &err {
            PluginError::NotFound { kind, .. } => {
                Self::new(StatusCode::NOT_FOUND, format!("{kind} not found"))
            }
            PluginError::Invalid(_) => Self::bad_request(err.to_string()),
            PluginError::Storage(_) => Self::internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "Request failed");
        }
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}
