use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{audit, downloads, exports, handlers, middleware::metrics_middleware};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health, config and metrics
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::metrics))
        // Audit
        .route("/audit", get(audit::query_audit))
        // Export jobs
        .route("/exports", post(exports::submit_export))
        .route("/exports", get(exports::list_exports))
        .route("/exports/{id}", get(exports::get_export))
        .route("/exports/{id}", delete(exports::delete_export))
        // Signed downloads
        .route("/downloads/{*key}", get(downloads::download))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
