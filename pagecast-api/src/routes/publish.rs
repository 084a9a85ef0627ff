use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use libpagecast::service::publishing::PublishRequest;
use libpagecast::PublishOutcome;
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::json::ApiJson;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/publish", post(publish))
}

/// POST /publish - publish content to several accounts now
///
/// Per-account failures are part of a 200 response; only request-level
/// problems produce an error status.
async fn publish(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(request): ApiJson<PublishRequest>,
) -> ApiResult<Json<PublishOutcome>> {
    let outcome = state
        .service
        .publishing()
        .publish_now(user.id(), &request)
        .await?;
    Ok(Json(outcome))
}
