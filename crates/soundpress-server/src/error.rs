//! Error-to-HTTP response conversion.
//!
//! Implements `IntoResponse` for [`soundpress_core::Error`] so that route
//! handlers can return `Result<T, AppError>` directly.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for an external type.
pub struct AppError {
    inner: soundpress_core::Error,
}

impl AppError {
    pub fn new(inner: soundpress_core::Error) -> Self {
        Self { inner }
    }
}

impl From<soundpress_core::Error> for AppError {
    fn from(e: soundpress_core::Error) -> Self {
        Self::new(e)
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        Self::new(e.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                "Server error in API handler"
            );
        }

        let code = match &self.inner {
            soundpress_core::Error::NotFound { .. } => "not_found",
            soundpress_core::Error::Unauthorized(_) => "unauthorized",
            soundpress_core::Error::Validation(_) => "validation_error",
            soundpress_core::Error::Conflict(_) => "conflict",
            soundpress_core::Error::Io { .. } => "io_error",
            soundpress_core::Error::Tool { .. } => "tool_error",
            soundpress_core::Error::Internal(_) => "internal_error",
        };

        let body = json!({
            "error": self.inner.to_string(),
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
