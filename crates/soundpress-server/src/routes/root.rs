//! Service information endpoint.

use axum::Json;
use serde_json::{json, Value};

/// GET /
///
/// Unauthenticated service banner with the endpoint map.
pub async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "soundpress",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "GET /api/health",
            "presets": "GET /api/presets",
            "submit": "POST /api/jobs",
            "status": "GET /api/jobs/{id}",
            "download": "GET /api/jobs/{id}/download",
            "delete": "DELETE /api/jobs/{id}",
        },
    }))
}
