//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use soundpress_av::ToolInfo;

use crate::context::AppContext;
use crate::store::JobStats;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub tools: Vec<ToolInfo>,
    pub jobs: JobStats,
}

/// GET /api/health
///
/// Reports external tool availability and job counts. Status is "degraded"
/// when ffmpeg is missing, since no job can succeed without it.
pub async fn health_check(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    let tools = ctx.tools.check_all();
    let ffmpeg_ok = tools.iter().any(|t| t.name == "ffmpeg" && t.available);

    Json(HealthResponse {
        status: if ffmpeg_ok { "ok" } else { "degraded" },
        tools,
        jobs: ctx.store.stats(),
    })
}
