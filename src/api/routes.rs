//! API Routes
//!
//! Configures the Axum router with all endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    flush_user_handler, get_user_handler, health_handler, invalidate_user_handler,
    set_user_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /users/:id` - Read a user through the cache
/// - `PUT /users/:id` - Write a user back through the cache
/// - `DELETE /users/:id` - Drop the cached user and its pending write
/// - `POST /users/:id/flush` - Persist the cached user now
/// - `GET /stats` - Cache counters and failed writes
/// - `GET /health` - Health check endpoint
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/users/:id",
            get(get_user_handler)
                .put(set_user_handler)
                .delete(invalidate_user_handler),
        )
        .route("/users/:id/flush", post(flush_user_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
