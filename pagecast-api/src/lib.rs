//! pagecast-api - HTTP surface for Pagecast
//!
//! Exposes immediate publishing, scheduling, retry and analytics over JSON.
//! Callers are identified by the `x-user-id` header set by the gateway.

pub mod auth;
pub mod error;
pub mod json;
pub mod routes;
pub mod state;

use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// The full router with tracing and CORS layers
pub fn app(state: Arc<AppState>) -> Router {
    routes::build_routes()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
