//! Pipeline rejections and handler failures as HTTP responses.
//!
//! # Design Decisions
//! - Every rejection has a fixed JSON body; internals never reach the client
//! - Handler failures carry a response extension so the guard can audit them

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::security::rate_limit::RateLimitDecision;

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// A terminal state of the security pipeline other than the handler's own response.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    RateLimited(RateLimitDecision),
    Unauthenticated,
    Forbidden,
    InvalidInput(Vec<String>),
    InvalidJson,
    PayloadTooLarge,
    Internal,
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Rejection::Unauthenticated => StatusCode::UNAUTHORIZED,
            Rejection::Forbidden => StatusCode::FORBIDDEN,
            Rejection::InvalidInput(_) | Rejection::InvalidJson => StatusCode::BAD_REQUEST,
            Rejection::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Rejection::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Pipeline stage label for metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            Rejection::RateLimited(_) => "rate_limit",
            Rejection::Unauthenticated => "authentication",
            Rejection::Forbidden => "authorization",
            Rejection::InvalidInput(_) | Rejection::InvalidJson | Rejection::PayloadTooLarge => {
                "validation"
            }
            Rejection::Internal => "handler",
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Rejection::RateLimited(decision) => {
                let retry_after = decision.retry_after_secs.unwrap_or(0);
                let mut response = (
                    status,
                    Json(json!({"error": "Too many requests", "retryAfter": retry_after})),
                )
                    .into_response();
                let headers = response.headers_mut();
                apply_rate_limit_headers(headers, &decision);
                headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
                response
            }
            Rejection::Unauthenticated => {
                (status, Json(json!({"error": "Authentication required"}))).into_response()
            }
            Rejection::Forbidden => {
                (status, Json(json!({"error": "Insufficient permissions"}))).into_response()
            }
            Rejection::InvalidInput(details) => (
                status,
                Json(json!({"error": "Invalid input", "details": details})),
            )
                .into_response(),
            Rejection::InvalidJson => {
                (status, Json(json!({"error": "Invalid JSON payload"}))).into_response()
            }
            Rejection::PayloadTooLarge => {
                (status, Json(json!({"error": "Payload too large"}))).into_response()
            }
            Rejection::Internal => {
                (status, Json(json!({"error": "Internal server error"}))).into_response()
            }
        }
    }
}

/// `X-RateLimit-*` headers describing the current window.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(decision.reset_at_unix_secs()));
}

/// Marker left on a response produced from a [`HandlerError`].
#[derive(Debug, Clone)]
pub struct HandlerFailure(pub String);

/// Error returned by guarded handlers. Always rendered as an opaque 500.
///
/// Converts from any `std::error::Error`, so handlers can use `?`.
#[derive(Debug)]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<E> From<E> for HandlerError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self(error.to_string())
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let mut response = Rejection::Internal.into_response();
        response.extensions_mut().insert(HandlerFailure(self.0));
        response
    }
}
