pub mod analytics;
pub mod health;
pub mod publish;
pub mod retry;
pub mod schedule;

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// Build all routes for the API
pub fn build_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(health::routes())
        .merge(publish::routes())
        .merge(schedule::routes())
        .merge(retry::routes())
        .merge(analytics::routes())
}
