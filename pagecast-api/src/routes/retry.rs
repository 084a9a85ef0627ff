use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use libpagecast::PublishResult;
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::json::ApiJson;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryRequest {
    pub content_id: String,
    pub account_id: String,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/retry", post(retry))
}

/// POST /retry - re-run publishing for one (content, account) pair
async fn retry(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(request): ApiJson<RetryRequest>,
) -> ApiResult<Json<PublishResult>> {
    let result = state
        .service
        .retry()
        .retry_publication(user.id(), &request.content_id, &request.account_id)
        .await?;
    Ok(Json(result))
}
