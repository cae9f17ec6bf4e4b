use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Drop collection
        .route(
            "/drops",
            get(handlers::list_drops).post(handlers::create_drop),
        )
        .route("/drops/nearby", get(handlers::nearby_drops))
        .route("/drops/sync", post(handlers::sync_drops))
        .route(
            "/drops/:drop_id",
            get(handlers::get_drop).delete(handlers::delete_drop),
        )
        .route("/drops/:drop_id/audio", get(handlers::get_drop_audio))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
