//! HTTP error responses in the OpenAI error envelope.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ccgw_core::openai::{ErrorBody, ErrorResponse};
use tracing::{error, warn};

use crate::session::SessionError;

/// Errors returned by request handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<ccgw_core::Error> for ApiError {
    fn from(err: ccgw_core::Error) -> Self {
        Self::Session(err.into())
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, Option<&'static str>) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request_error", None),
            Self::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "invalid_request_error",
                Some("not_found"),
            ),
            Self::Session(err) => match err {
                SessionError::InvalidPath(_) => (
                    StatusCode::BAD_REQUEST,
                    "invalid_request_error",
                    Some("invalid_path"),
                ),
                SessionError::CapacityExceeded { .. } => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "rate_limit_exceeded",
                    Some("rate_limit_exceeded"),
                ),
                SessionError::DuplicateSession { .. } => (
                    StatusCode::CONFLICT,
                    "invalid_request_error",
                    Some("session_exists"),
                ),
                SessionError::BinaryUnavailable { .. } => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "service_unavailable",
                    Some("claude_unavailable"),
                ),
                SessionError::StartFailure { .. } => (
                    StatusCode::BAD_GATEWAY,
                    "api_error",
                    Some("start_failure"),
                ),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, code) = self.parts();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let body = ErrorResponse {
            error: ErrorBody {
                message: self.to_string(),
                kind: kind.to_string(),
                code: code.map(String::from),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_errors_map_to_statuses() {
        let cases = [
            (SessionError::InvalidPath("x".into()), StatusCode::BAD_REQUEST),
            (
                SessionError::CapacityExceeded { max: 1 },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                SessionError::DuplicateSession { id: "a".into() },
                StatusCode::CONFLICT,
            ),
            (
                SessionError::BinaryUnavailable { reason: "x".into() },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                SessionError::StartFailure { reason: "x".into() },
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn core_path_errors_are_bad_requests() {
        let err = ApiError::from(ccgw_core::Error::InvalidPath("nope".into()));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
