//! Signed, time-limited authentication tokens.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Default token lifetime (24 hours).
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

/// Errors raised while issuing or verifying tokens.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Bad signature, malformed token or expired token. The cause is logged,
    /// never reported.
    #[error("Invalid token")]
    InvalidToken,

    /// The signing secret is empty after trimming
    #[error("Token signing secret is not configured")]
    EmptySecret,

    /// The token lifetime is zero or out of range
    #[error("Invalid token lifetime: {0}")]
    InvalidTtl(String),

    /// Encoding failed
    #[error("Failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Claims carried by an authentication token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthClaims {
    /// Marks the bearer as authenticated
    pub authenticated: bool,
    /// Issued at, seconds since the epoch
    pub iat: i64,
    /// Expiry, seconds since the epoch
    pub exp: i64,
    /// Token identifier, used to correlate logs
    pub jti: String,
}

impl AuthClaims {
    /// Claims for a session authenticated at `now` and valid for `ttl`.
    pub fn authenticated_at(now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            authenticated: true,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// Whether the claims are expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}

/// Issues and verifies HS256 tokens with one shared secret.
///
/// Verification is stateless; no issued token is stored.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenIssuer {
    /// Create an issuer for `secret`, minting tokens valid for `ttl`.
    pub fn new(secret: &str, ttl: std::time::Duration) -> Result<Self, TokenError> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }

        let ttl = Duration::from_std(ttl)
            .ok()
            .filter(|ttl| *ttl > Duration::zero())
            .ok_or_else(|| TokenError::InvalidTtl(format!("{:?}", ttl)))?;

        // Expiry is checked against a caller-supplied clock in `verify_at`.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        })
    }

    /// Lifetime of issued tokens.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a token for a session authenticated now.
    pub fn issue(&self) -> Result<(String, AuthClaims), TokenError> {
        self.issue_at(Utc::now())
    }

    /// Mint a token for a session authenticated at `now`.
    pub fn issue_at(&self, now: DateTime<Utc>) -> Result<(String, AuthClaims), TokenError> {
        let claims = AuthClaims::authenticated_at(now, self.ttl);
        let token = self.sign(&claims)?;
        Ok((token, claims))
    }

    /// Sign `claims` as they are.
    pub fn sign(&self, claims: &AuthClaims) -> Result<String, TokenError> {
        Ok(encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.encoding_key,
        )?)
    }

    /// Verify `token` against the current time.
    pub fn verify(&self, token: &str) -> Result<AuthClaims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify signature, structure and expiry of `token` at `now`.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<AuthClaims, TokenError> {
        let data = decode::<AuthClaims>(token, &self.decoding_key, &self.validation).map_err(
            |e| {
                debug!(error = %e, "Token rejected");
                TokenError::InvalidToken
            },
        )?;

        if data.claims.is_expired(now) {
            debug!(token_id = %data.claims.jti, "Token rejected: expired");
            return Err(TokenError::InvalidToken);
        }

        Ok(data.claims)
    }
}
