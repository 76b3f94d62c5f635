//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;
pub mod state;

use axum::{middleware::from_fn, middleware::from_fn_with_state, routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub use routes::{create_public_router, create_router};
pub use state::AppState;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // Axum layers run in reverse order of addition:
    // logging -> session -> maintenance gate -> handler
    let protected_routes = create_router()
        .layer(from_fn_with_state(
            state.clone(),
            middleware::maintenance_middleware,
        ))
        .layer(from_fn(middleware::session_middleware));

    let api_router = protected_routes
        .merge(create_public_router())
        .layer(from_fn(middleware::logging_middleware));

    Router::new()
        // Health check (no auth)
        .route("/health", get(health_check))
        .nest("/api/v1", api_router)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
