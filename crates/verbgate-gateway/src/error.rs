//! API error types and responses.
//!
//! Dispatch errors keep the status and JSON body the proxy assigns them; the
//! gateway adds only the failures that happen before a request reaches it.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use verbgate_proxy::ProxyError;

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The HTTP method is not one of the routing verbs.
    #[error("unsupported HTTP method: {0}")]
    MethodNotAllowed(String),

    /// The dispatch engine rejected or failed the request.
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// Error details.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Proxy(err) => StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    /// Get the error code string for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MethodNotAllowed(_) => "method_not_allowed",
            Self::Proxy(err) => err.code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            Self::Proxy(err) => (
                status,
                [(header::CONTENT_TYPE, "application/json")],
                err.to_body(),
            )
                .into_response(),
            Self::MethodNotAllowed(_) => {
                let body = ErrorResponse {
                    error: ErrorBody {
                        code: self.code(),
                        message: self.to_string(),
                    },
                };
                (status, Json(body)).into_response()
            }
        }
    }
}
