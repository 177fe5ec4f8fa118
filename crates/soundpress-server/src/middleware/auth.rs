//! API key authentication middleware.
//!
//! When `server.api_key` is configured, protected routes require a matching
//! `X-API-Key` header. With no key configured the check is skipped entirely
//! (development mode).

use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::context::AppContext;

/// Header carrying the client API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Check a presented key against the configured one.
pub fn validate_api_key(configured: Option<&str>, presented: Option<&str>) -> bool {
    match configured {
        None => true,
        Some(expected) => presented == Some(expected),
    }
}

/// Authentication middleware. Applied to protected routes only.
pub async fn auth_middleware(
    State(ctx): State<AppContext>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    if validate_api_key(ctx.config.server.api_key.as_deref(), presented) {
        Ok(next.run(request).await)
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            axum::Json(json!({ "error": "Invalid or missing API key", "code": "unauthorized" })),
        )
            .into_response())
    }
}
