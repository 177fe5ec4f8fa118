//! Preset listing endpoint.

use axum::Json;
use serde_json::{json, Value};

use soundpress_av::presets;

/// GET /api/presets
///
/// The closed set of compression presets clients can submit against.
pub async fn list_presets() -> Json<Value> {
    Json(json!({
        "default": presets::DEFAULT_PRESET,
        "presets": presets::all(),
    }))
}
