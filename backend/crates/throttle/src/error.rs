//! Throttle Error Types
//!
//! This module provides rate-limit specific error variants that integrate
//! with the unified `kernel::error::AppError` system.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use thiserror::Error;

use crate::domain::value_objects::{Allowance, Decision, Denial};
use crate::presentation::dto::RateLimitedResponse;

/// Throttle-specific result type alias
pub type ThrottleResult<T> = Result<T, ThrottleError>;

/// Throttle-specific error variants
#[derive(Debug, Error)]
pub enum ThrottleError {
    /// Caller is blocked
    #[error("{}", .0.message)]
    RateLimited(Denial),

    /// No counter record with the requested ID
    #[error("Rate limit record not found")]
    RecordNotFound,

    /// Malformed admin input (pagination, filters, quota)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ThrottleError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ThrottleError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ThrottleError::RecordNotFound => StatusCode::NOT_FOUND,
            ThrottleError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ThrottleError::Database(_) | ThrottleError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ThrottleError::RateLimited(_) => ErrorKind::TooManyRequests,
            ThrottleError::RecordNotFound => ErrorKind::NotFound,
            ThrottleError::InvalidRequest(_) => ErrorKind::BadRequest,
            ThrottleError::Database(_) | ThrottleError::Internal(_) => {
                ErrorKind::InternalServerError
            }
        }
    }

    /// Log the error with appropriate level
    fn log(&self) {
        match self {
            ThrottleError::Database(e) => {
                tracing::error!(error = %e, "Rate limit database error");
            }
            ThrottleError::Internal(msg) => {
                tracing::error!(message = %msg, "Rate limit internal error");
            }
            ThrottleError::RateLimited(denial) => {
                tracing::warn!(
                    block_kind = %denial.kind,
                    violation_count = denial.violation_count,
                    "Request rejected by rate limit"
                );
            }
            _ => {
                tracing::debug!(error = %self, "Rate limit error");
            }
        }
    }
}

impl From<ThrottleError> for AppError {
    fn from(err: ThrottleError) -> Self {
        match err {
            // Don't leak driver details to clients
            ThrottleError::Database(e) => AppError::internal("Database error")
                .with_source(e)
                .with_action("Retry the request"),
            ThrottleError::Internal(_) => AppError::internal("Internal error"),
            other => AppError::new(other.kind(), other.to_string()),
        }
    }
}

impl IntoResponse for ThrottleError {
    fn into_response(self) -> Response {
        self.log();
        match self {
            ThrottleError::RateLimited(denial) => {
                let retry_after = denial.retry_after_secs;
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(RateLimitedResponse::from(denial)),
                )
                    .into_response();
                if let Some(secs) = retry_after {
                    response
                        .headers_mut()
                        .insert(header::RETRY_AFTER, HeaderValue::from(secs));
                }
                response
            }
            other => AppError::from(other).into_response(),
        }
    }
}

impl Decision {
    /// `Err(RateLimited)` for a denial, for callers that propagate with `?`
    pub fn into_result(self) -> ThrottleResult<Allowance> {
        match self {
            Decision::Allow(allowance) => Ok(allowance),
            Decision::Deny(denial) => Err(ThrottleError::RateLimited(denial)),
        }
    }
}
