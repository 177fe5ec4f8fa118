//! Axum router construction.
//!
//! Builds the application router with all route groups and middleware
//! layers. `/` and `/api/health` are open; everything else under `/api`
//! requires the API key when one is configured, and job submission is
//! additionally rate limited.

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::context::AppContext;
use crate::middleware::auth::auth_middleware;
use crate::middleware::rate_limit::rate_limit_middleware;
use crate::routes;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = build_cors(&ctx.config.server.allowed_origins);

    // Submission gets its own rate limit on top of auth.
    let submit_routes = Router::new()
        .route("/jobs", post(routes::jobs::submit_job))
        .route_layer(middleware::from_fn_with_state(
            ctx.clone(),
            rate_limit_middleware,
        ));

    let protected_routes = Router::new()
        .route("/presets", get(routes::presets::list_presets))
        .route(
            "/jobs/{id}",
            get(routes::jobs::get_job).delete(routes::jobs::delete_job),
        )
        .route("/jobs/{id}/download", get(routes::jobs::download_job))
        .merge(submit_routes)
        .layer(middleware::from_fn_with_state(ctx.clone(), auth_middleware));

    let api = Router::new()
        .route("/health", get(routes::health::health_check))
        .merge(protected_routes);

    Router::new()
        .route("/", get(routes::root::service_info))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(ctx.config.server.max_upload_bytes()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// CORS policy from the configured origin allowlist. An empty list means
/// any origin.
fn build_cors(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}
