//! JSON response shaping for the auth endpoints.

use axum::http::header::{ALLOW, RETRY_AFTER};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::ratelimit::RateLimitDecision;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

const CONFIGURATION_ERROR: &str = "Server configuration error";
const INTERNAL_ERROR: &str = "Internal server error";

/// Successful login body.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
}

/// Successful verify body.
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub authenticated: bool,
    pub valid: bool,
}

/// Failures of `/auth/login`.
#[derive(Debug)]
pub enum LoginError {
    /// Missing or malformed body
    BadRequest(&'static str),
    /// Wrong password; the attempt counted
    InvalidPassword(RateLimitDecision),
    /// Too many attempts in the current window
    RateLimited(RateLimitDecision),
    /// Required secret missing. Detail is only sent in development mode.
    Misconfigured(Option<String>),
    /// Token could not be minted
    Internal,
}

impl IntoResponse for LoginError {
    fn into_response(self) -> Response {
        match self {
            LoginError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": message })),
            )
                .into_response(),
            LoginError::InvalidPassword(decision) => (
                StatusCode::UNAUTHORIZED,
                rate_limit_headers(&decision),
                Json(json!({
                    "success": false,
                    "error": "Invalid password",
                    "remaining": decision.remaining,
                    "windowResetAt": decision.window_reset_at,
                })),
            )
                .into_response(),
            LoginError::RateLimited(decision) => {
                let retry_after = decision.retry_after_secs.unwrap_or(1);
                let mut headers = rate_limit_headers(&decision);
                headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    headers,
                    Json(json!({
                        "success": false,
                        "error": "Too many login attempts. Please try again later.",
                        "retryAfter": retry_after,
                    })),
                )
                    .into_response()
            }
            LoginError::Misconfigured(detail) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(with_detail(
                    json!({ "success": false, "error": CONFIGURATION_ERROR }),
                    detail,
                )),
            )
                .into_response(),
            LoginError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": INTERNAL_ERROR })),
            )
                .into_response(),
        }
    }
}

/// Failures of `/auth/verify`. Why a token was rejected is never reported.
#[derive(Debug)]
pub enum VerifyError {
    /// No token in the body or `Authorization` header
    MissingToken,
    /// Forged, malformed, expired or non-authenticating token
    InvalidToken,
    /// Signing secret missing. Detail is only sent in development mode.
    Misconfigured(Option<String>),
}

impl IntoResponse for VerifyError {
    fn into_response(self) -> Response {
        match self {
            VerifyError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "authenticated": false, "error": "No token provided" })),
            )
                .into_response(),
            VerifyError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "authenticated": false, "error": "Invalid or expired token" })),
            )
                .into_response(),
            VerifyError::Misconfigured(detail) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(with_detail(
                    json!({ "authenticated": false, "error": CONFIGURATION_ERROR }),
                    detail,
                )),
            )
                .into_response(),
        }
    }
}

/// Answer for methods an endpoint does not serve.
pub async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(ALLOW, HeaderValue::from_static("POST, OPTIONS"))],
        Json(json!({ "success": false, "error": "Method not allowed" })),
    )
        .into_response()
}

/// Empty success for preflight requests the CORS layer did not answer.
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

fn rate_limit_headers(decision: &RateLimitDecision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(
        X_RATELIMIT_RESET,
        HeaderValue::from(decision.window_reset_at.timestamp()),
    );
    headers
}

fn with_detail(mut body: serde_json::Value, detail: Option<String>) -> serde_json::Value {
    if let (Some(detail), Some(object)) = (detail, body.as_object_mut()) {
        object.insert("detail".to_string(), serde_json::Value::String(detail));
    }
    body
}
