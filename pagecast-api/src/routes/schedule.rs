//! Scheduled post endpoints
//!
//! `scheduledAt` accepts an RFC 3339 timestamp or a relative duration such as
//! `"2h"`. Changes to an existing post answer every domain failure with 400.

use axum::extract::{Path, Query, State};
use axum::routing::{post, put};
use axum::{Json, Router};
use chrono::Utc;
use libpagecast::scheduling::{format_timestamp, parse_schedule_time};
use libpagecast::{ScheduleState, ScheduledPost};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::json::ApiJson;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub content_id: String,
    pub account_ids: Vec<String>,
    pub scheduled_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleRequest {
    pub scheduled_at: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub state: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleResponse {
    pub success: bool,
    pub message: String,
    pub post: ScheduledPost,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleListResponse {
    pub success: bool,
    pub posts: Vec<ScheduledPost>,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/schedule", post(schedule).get(list))
        .route("/schedule/{post_id}", put(reschedule).delete(cancel))
}

/// POST /schedule - persist a future publish
async fn schedule(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(request): ApiJson<ScheduleRequest>,
) -> ApiResult<Json<ScheduleResponse>> {
    let scheduled_at = parse_schedule_time(&request.scheduled_at, Utc::now())?;
    let post = state
        .service
        .scheduling()
        .schedule_post(
            user.id(),
            &request.content_id,
            &request.account_ids,
            scheduled_at,
        )
        .await?;

    Ok(Json(ScheduleResponse {
        success: true,
        message: format!("Scheduled for {}", format_timestamp(post.scheduled_at)),
        post,
    }))
}

/// GET /schedule?state=pending - the caller's scheduled posts
async fn list(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ScheduleListResponse>> {
    let filter = query
        .state
        .as_deref()
        .map(str::parse::<ScheduleState>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let posts = state
        .service
        .scheduling()
        .list_scheduled_posts(user.id(), filter)
        .await?;

    Ok(Json(ScheduleListResponse {
        success: true,
        posts,
    }))
}

/// PUT /schedule/{postId} - move a pending post
async fn reschedule(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(post_id): Path<String>,
    ApiJson(request): ApiJson<RescheduleRequest>,
) -> ApiResult<Json<ScheduleResponse>> {
    let scheduled_at = parse_schedule_time(&request.scheduled_at, Utc::now())
        .map_err(ApiError::for_schedule_change)?;
    let post = state
        .service
        .scheduling()
        .reschedule_post(user.id(), &post_id, scheduled_at)
        .await
        .map_err(ApiError::for_schedule_change)?;

    Ok(Json(ScheduleResponse {
        success: true,
        message: format!("Rescheduled for {}", format_timestamp(post.scheduled_at)),
        post,
    }))
}

/// DELETE /schedule/{postId} - cancel a pending post
async fn cancel(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(post_id): Path<String>,
) -> ApiResult<Json<ScheduleResponse>> {
    let post = state
        .service
        .scheduling()
        .cancel_scheduled_post(user.id(), &post_id)
        .await
        .map_err(ApiError::for_schedule_change)?;

    Ok(Json(ScheduleResponse {
        success: true,
        message: "Scheduled post cancelled".to_string(),
        post,
    }))
}
