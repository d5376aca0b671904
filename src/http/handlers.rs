//! Login and verify endpoint handlers.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};

use super::extract::ClientAddr;
use super::response::{LoginError, LoginResponse, VerifyError, VerifyResponse};
use super::AppState;
use crate::auth::{AuthError, Authenticated, CredentialKind};

#[derive(Debug, Default, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VerifyRequest {
    #[serde(default)]
    token: Option<String>,
}

/// `POST /auth/login`
///
/// Rate limiting runs first, so a denied client never reaches the password
/// comparison. A successful login clears the client's attempt record.
#[instrument(skip_all, fields(client = %client))]
pub async fn login_handler(
    State(state): State<AppState>,
    ClientAddr(client): ClientAddr,
    body: Bytes,
) -> Result<Json<LoginResponse>, LoginError> {
    let decision = state.limiter.check(&client).await;
    if !decision.allowed {
        warn!(
            retry_after_secs = decision.retry_after_secs,
            "Login rate limited"
        );
        return Err(LoginError::RateLimited(decision));
    }

    if let Some(reason) = state.gatekeeper.misconfiguration() {
        error!(reason = reason, "Login refused: server misconfigured");
        return Err(LoginError::Misconfigured(state.detail(reason)));
    }

    let request = parse_login(&body)?;
    let password = request
        .password
        .as_deref()
        .map(str::trim)
        .filter(|password| !password.is_empty())
        .ok_or(LoginError::BadRequest("Password is required"))?;

    match state
        .gatekeeper
        .authenticate(CredentialKind::Password(password))
    {
        Ok(Authenticated::Issued { token, .. }) => {
            state.limiter.clear(&client).await;
            info!("Login succeeded");
            Ok(Json(LoginResponse {
                success: true,
                token,
            }))
        }
        Ok(other) => {
            error!(outcome = ?other, "Password login produced no token");
            Err(LoginError::Internal)
        }
        Err(AuthError::InvalidPassword) | Err(AuthError::InvalidToken) => {
            info!(remaining = decision.remaining, "Login failed: invalid password");
            Err(LoginError::InvalidPassword(decision))
        }
        Err(AuthError::Misconfigured(reason)) => {
            error!(reason = reason, "Login refused: server misconfigured");
            Err(LoginError::Misconfigured(state.detail(reason)))
        }
        Err(AuthError::Issuance(_)) => Err(LoginError::Internal),
    }
}

/// `POST /auth/verify`
///
/// Every rejection looks the same to the caller.
#[instrument(skip_all)]
pub async fn verify_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<VerifyResponse>, VerifyError> {
    let Some(token) = presented_token(&body, &headers) else {
        debug!("Verify called without a token");
        return Err(VerifyError::MissingToken);
    };

    let credential = state.gatekeeper.classify_token(&token);
    debug!(kind = credential.label(), "Verifying credential");

    match state.gatekeeper.authenticate(credential) {
        Ok(Authenticated::Session(_)) | Ok(Authenticated::Bypass) => Ok(Json(VerifyResponse {
            authenticated: true,
            valid: true,
        })),
        Ok(Authenticated::Issued { .. }) => Err(VerifyError::InvalidToken),
        Err(AuthError::Misconfigured(reason)) => {
            error!(reason = reason, "Verify refused: server misconfigured");
            Err(VerifyError::Misconfigured(state.detail(reason)))
        }
        Err(e) => {
            debug!(error = %e, "Token rejected");
            Err(VerifyError::InvalidToken)
        }
    }
}

/// `GET /health`
pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn parse_login(body: &[u8]) -> Result<LoginRequest, LoginError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(LoginError::BadRequest("Password is required"));
    }

    serde_json::from_slice(body).map_err(|e| {
        debug!(error = %e, "Malformed login body");
        LoginError::BadRequest("Invalid request body")
    })
}

/// Token from the JSON body, falling back to an `Authorization: Bearer`
/// header.
fn presented_token(body: &[u8], headers: &HeaderMap) -> Option<String> {
    let from_body = serde_json::from_slice::<VerifyRequest>(body)
        .ok()
        .and_then(|request| request.token);

    from_body
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(str::to_string)
        })
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}
