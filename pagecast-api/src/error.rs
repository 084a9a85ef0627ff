//! HTTP error mapping
//!
//! Every failure leaves the API as `{"success": false, "error": "..."}`.
//! Infrastructure errors are logged with full context and answered with a
//! generic 500 message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use libpagecast::{PagecastError, PlatformError};
use serde::Serialize;
use tracing::error;

#[derive(Debug)]
pub enum ApiError {
    Unauthenticated,
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    /// A platform call failed while serving the request
    Upstream(String),
    Internal,
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl ApiError {
    /// Mapping for `PUT`/`DELETE /schedule/{postId}`, where every domain
    /// failure is a 400
    pub fn for_schedule_change(err: PagecastError) -> Self {
        if err.is_client_error() {
            ApiError::BadRequest(err.to_string())
        } else {
            ApiError::from(err)
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Unauthenticated => "Missing x-user-id header".to_string(),
            ApiError::BadRequest(m)
            | ApiError::Forbidden(m)
            | ApiError::NotFound(m)
            | ApiError::Conflict(m)
            | ApiError::Upstream(m) => m.clone(),
            ApiError::Internal => "Internal server error".to_string(),
        }
    }
}

impl From<PagecastError> for ApiError {
    fn from(err: PagecastError) -> Self {
        match err {
            PagecastError::NotFound(_) => ApiError::NotFound(err.to_string()),
            PagecastError::Unauthorized(_) => ApiError::Forbidden(err.to_string()),
            PagecastError::Conflict(_) => ApiError::Conflict(err.to_string()),
            PagecastError::InvalidInput(_)
            | PagecastError::Validation(_)
            | PagecastError::InvalidScheduleTime(_)
            | PagecastError::AccountExpired(_) => ApiError::BadRequest(err.to_string()),
            PagecastError::Platform(PlatformError::NotConfigured(_)) => {
                ApiError::BadRequest(err.to_string())
            }
            PagecastError::Platform(_) => ApiError::Upstream(err.to_string()),
            PagecastError::Config(_) | PagecastError::Database(_) | PagecastError::Crypto(_) => {
                error!(error = %err, "Request failed");
                ApiError::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use libpagecast::error::DbError;

    #[test]
    fn test_domain_error_statuses() {
        let cases = [
            (PagecastError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (PagecastError::Unauthorized("x".into()), StatusCode::FORBIDDEN),
            (PagecastError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                PagecastError::InvalidScheduleTime("x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                PagecastError::Platform(PlatformError::Network("x".into())),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_schedule_changes_are_bad_requests() {
        for err in [
            PagecastError::NotFound("x".into()),
            PagecastError::Unauthorized("x".into()),
            PagecastError::Conflict("x".into()),
        ] {
            assert_eq!(
                ApiError::for_schedule_change(err).status(),
                StatusCode::BAD_REQUEST
            );
        }
    }

    #[test]
    fn test_infra_errors_are_generic() {
        let err = PagecastError::Database(DbError::IoError(std::io::Error::other("disk gone")));
        let api = ApiError::for_schedule_change(err);

        assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.message(), "Internal server error");
    }
}
