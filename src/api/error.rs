use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::fmt;
use std::time::Duration;

use super::ApiResponse;
use crate::security::RateLimitExceeded;
use crate::services::{AuthError, FieldErrors, ServiceError};

#[derive(Debug)]
pub enum ApiError {
    Validation(FieldErrors),

    Unauthenticated,

    Auth(AuthError),

    Forbidden,

    NotFound(String),

    Conflict(String),

    TooManyRequests { retry_after: Duration },

    InternalError(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(fields) => write!(f, "Validation error: {} field(s)", fields.len()),
            Self::Unauthenticated => write!(f, "Authentication required"),
            Self::Auth(err) => write!(f, "Authentication failed: {err}"),
            Self::Forbidden => write!(f, "Forbidden"),
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::Conflict(msg) => write!(f, "Conflict: {msg}"),
            Self::TooManyRequests { retry_after } => {
                write!(f, "Too many requests, retry after {}s", retry_after.as_secs())
            }
            Self::InternalError(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// Whole seconds, never zero, as expected by `Retry-After`.
fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 || secs == 0 {
        secs + 1
    } else {
        secs
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(fields) => {
                let body = ApiResponse::<()>::error("Validation failed")
                    .with_code("validation_failed")
                    .with_fields(fields);
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            Self::Unauthenticated => {
                let body =
                    ApiResponse::<()>::error("Authentication required").with_code("unauthenticated");
                (StatusCode::UNAUTHORIZED, Json(body)).into_response()
            }
            Self::Auth(AuthError::Internal(msg)) => {
                tracing::error!("Authentication error: {}", msg);
                let body = ApiResponse::<()>::error("An internal error occurred")
                    .with_code("internal_error");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
            Self::Auth(err) => {
                let status = match err {
                    AuthError::Locked { .. } => StatusCode::TOO_MANY_REQUESTS,
                    _ => StatusCode::UNAUTHORIZED,
                };
                let body = ApiResponse::<()>::error(err.to_string()).with_code(err.code());
                let mut response = (status, Json(body)).into_response();
                if let AuthError::Locked { retry_after } = err {
                    response.headers_mut().insert(
                        header::RETRY_AFTER,
                        HeaderValue::from(retry_after_secs(retry_after)),
                    );
                }
                response
            }
            Self::Forbidden => {
                let body = ApiResponse::<()>::error("Forbidden").with_code("forbidden");
                (StatusCode::FORBIDDEN, Json(body)).into_response()
            }
            Self::NotFound(msg) => {
                let body = ApiResponse::<()>::error(msg).with_code("not_found");
                (StatusCode::NOT_FOUND, Json(body)).into_response()
            }
            Self::Conflict(msg) => {
                let body = ApiResponse::<()>::error(msg).with_code("conflict");
                (StatusCode::CONFLICT, Json(body)).into_response()
            }
            Self::TooManyRequests { retry_after } => {
                let body =
                    ApiResponse::<()>::error("Too many requests").with_code("rate_limited");
                let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                response.headers_mut().insert(
                    header::RETRY_AFTER,
                    HeaderValue::from(retry_after_secs(retry_after)),
                );
                response
            }
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                let body = ApiResponse::<()>::error("An internal error occurred")
                    .with_code("internal_error");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(format!("{err:#}"))
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound { .. } => Self::NotFound(err.to_string()),
            ServiceError::Validation(fields) => Self::Validation(fields),
            ServiceError::Conflict(msg) => Self::Conflict(msg),
            ServiceError::Forbidden => Self::Forbidden,
            ServiceError::Cipher(_) | ServiceError::Audit(_) | ServiceError::Internal(_) => {
                Self::InternalError(err.to_string())
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl From<RateLimitExceeded> for ApiError {
    fn from(err: RateLimitExceeded) -> Self {
        Self::TooManyRequests {
            retry_after: err.retry_after,
        }
    }
}

impl ApiError {
    pub fn validation(field: &str, msg: impl Into<String>) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(field.to_string(), msg.into());
        Self::Validation(fields)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_millis(1)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1500)), 2);
        assert_eq!(retry_after_secs(Duration::from_secs(60)), 60);
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::validation("name", "required"), StatusCode::BAD_REQUEST),
            (ApiError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (
                ApiError::Auth(AuthError::MfaRequired),
                StatusCode::UNAUTHORIZED,
            ),
            (ApiError::Forbidden, StatusCode::FORBIDDEN),
            (
                ApiError::from(ServiceError::not_found("client", 9)),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(ServiceError::Conflict("taken".into())),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::TooManyRequests {
                    retry_after: Duration::from_secs(3),
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                ApiError::from(anyhow::anyhow!("disk on fire")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_rate_limit_sets_retry_after() {
        let response = ApiError::TooManyRequests {
            retry_after: Duration::from_secs(42),
        }
        .into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
