use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use libpagecast::PostAnalytics;
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/analytics/{content_id}", get(get_analytics))
        .route("/analytics/{content_id}/collect", post(collect))
}

/// GET /analytics/{contentId} - the stored metrics row
async fn get_analytics(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(content_id): Path<String>,
) -> ApiResult<Json<PostAnalytics>> {
    let analytics = state.service.analytics().get(user.id(), &content_id).await?;
    Ok(Json(analytics))
}

/// POST /analytics/{contentId}/collect - fetch fresh metrics now
async fn collect(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(content_id): Path<String>,
) -> ApiResult<Json<PostAnalytics>> {
    let analytics = state
        .service
        .analytics()
        .collect_for_content(user.id(), &content_id)
        .await?;
    Ok(Json(analytics))
}
