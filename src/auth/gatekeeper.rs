//! Password check and token issuance for the single admin account.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::credential::{secrets_match, BypassPolicy, CredentialKind};
use super::token::{AuthClaims, TokenError, TokenIssuer};

/// Why a credential was not accepted.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A required secret is missing; the gate fails closed
    #[error("Server misconfigured: {0}")]
    Misconfigured(&'static str),

    /// Submitted password does not match
    #[error("Invalid password")]
    InvalidPassword,

    /// Token is forged, malformed, expired or not an authentication token
    #[error("Invalid token")]
    InvalidToken,

    /// Token could not be minted
    #[error("Token issuance failed: {0}")]
    Issuance(TokenError),
}

/// A credential the gate accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authenticated {
    /// Password matched and a new token was minted
    Issued { token: String, claims: AuthClaims },
    /// A previously issued token verified
    Session(AuthClaims),
    /// A bypass token was presented
    Bypass,
}

/// Validates credentials against the configured secrets.
pub struct Gatekeeper {
    admin_password: Option<SecretString>,
    issuer: Option<TokenIssuer>,
    bypass: BypassPolicy,
}

impl Gatekeeper {
    /// Create a gatekeeper.
    ///
    /// Missing or blank secrets do not fail here: the gate is built in a
    /// closed state and every credential check reports `Misconfigured`.
    pub fn new(
        admin_password: Option<&str>,
        jwt_secret: Option<&str>,
        token_ttl: std::time::Duration,
        bypass: BypassPolicy,
    ) -> Result<Self, TokenError> {
        let admin_password = admin_password
            .map(str::trim)
            .filter(|password| !password.is_empty())
            .map(|password| SecretString::new(password.to_string().into_boxed_str()));

        let issuer = match TokenIssuer::new(jwt_secret.unwrap_or_default(), token_ttl) {
            Ok(issuer) => Some(issuer),
            Err(TokenError::EmptySecret) => None,
            Err(e) => return Err(e),
        };

        if bypass.is_enabled() {
            info!("Bypass token path enabled");
        }

        Ok(Self {
            admin_password,
            issuer,
            bypass,
        })
    }

    /// Describe the first missing secret, if any.
    pub fn misconfiguration(&self) -> Option<&'static str> {
        if self.issuer.is_none() {
            Some("token signing secret is not configured")
        } else if self.admin_password.is_none() {
            Some("admin password is not configured")
        } else {
            None
        }
    }

    /// Classify a presented token against the bypass policy.
    pub fn classify_token<'a>(&self, token: &'a str) -> CredentialKind<'a> {
        CredentialKind::from_token(token, &self.bypass)
    }

    /// Check a credential at the current time.
    pub fn authenticate(&self, credential: CredentialKind<'_>) -> Result<Authenticated, AuthError> {
        self.authenticate_at(credential, Utc::now())
    }

    /// Check a credential at `now`.
    pub fn authenticate_at(
        &self,
        credential: CredentialKind<'_>,
        now: DateTime<Utc>,
    ) -> Result<Authenticated, AuthError> {
        match credential {
            CredentialKind::Password(submitted) => self.login(submitted, now),
            CredentialKind::BypassToken(_) => {
                warn!("Accepted bypass token without signature verification");
                Ok(Authenticated::Bypass)
            }
            CredentialKind::SignedToken(token) => {
                let issuer = self.issuer()?;
                let claims = issuer
                    .verify_at(token, now)
                    .map_err(|_| AuthError::InvalidToken)?;

                if !claims.authenticated {
                    debug!(token_id = %claims.jti, "Token does not assert authentication");
                    return Err(AuthError::InvalidToken);
                }

                Ok(Authenticated::Session(claims))
            }
        }
    }

    fn login(&self, submitted: &str, now: DateTime<Utc>) -> Result<Authenticated, AuthError> {
        let issuer = self.issuer()?;
        let expected = self
            .admin_password
            .as_ref()
            .ok_or(AuthError::Misconfigured("admin password is not configured"))?;

        if !secrets_match(submitted.trim(), expected.expose_secret()) {
            return Err(AuthError::InvalidPassword);
        }

        let (token, claims) = issuer.issue_at(now).map_err(|e| {
            error!(error = %e, "Failed to sign token");
            AuthError::Issuance(e)
        })?;

        info!(token_id = %claims.jti, "Issued authentication token");
        Ok(Authenticated::Issued { token, claims })
    }

    fn issuer(&self) -> Result<&TokenIssuer, AuthError> {
        self.issuer
            .as_ref()
            .ok_or(AuthError::Misconfigured("token signing secret is not configured"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const DAY: std::time::Duration = std::time::Duration::from_secs(86_400);

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn gatekeeper() -> Gatekeeper {
        Gatekeeper::new(
            Some(" dauns33 "),
            Some("signing-key"),
            DAY,
            BypassPolicy::with_prefix("demo_"),
        )
        .unwrap()
    }

    #[test]
    fn test_correct_password_issues_token() {
        let gate = gatekeeper();

        let result = gate.authenticate_at(CredentialKind::Password("dauns33"), t0());

        match result {
            Ok(Authenticated::Issued { token, claims }) => {
                assert!(!token.is_empty());
                assert!(claims.authenticated);
                assert_eq!(claims.exp - claims.iat, 86_400);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_submitted_password_is_trimmed() {
        let gate = gatekeeper();

        assert!(gate
            .authenticate_at(CredentialKind::Password("  dauns33\n"), t0())
            .is_ok());
    }

    #[test]
    fn test_wrong_password_rejected() {
        let gate = gatekeeper();

        assert!(matches!(
            gate.authenticate_at(CredentialKind::Password("wrong"), t0()),
            Err(AuthError::InvalidPassword)
        ));
    }

    #[test]
    fn test_issued_token_verifies_until_expiry() {
        let gate = gatekeeper();
        let Ok(Authenticated::Issued { token, claims }) =
            gate.authenticate_at(CredentialKind::Password("dauns33"), t0())
        else {
            panic!("login failed");
        };

        let session = gate.authenticate_at(
            gate.classify_token(&token),
            t0() + Duration::hours(1),
        );
        assert_eq!(session.unwrap(), Authenticated::Session(claims));

        let expired = gate.authenticate_at(gate.classify_token(&token), t0() + Duration::days(1));
        assert!(matches!(expired, Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_unauthenticated_claims_rejected() {
        let issuer = TokenIssuer::new("signing-key", DAY).unwrap();
        let mut claims = AuthClaims::authenticated_at(t0(), Duration::hours(1));
        claims.authenticated = false;
        let token = issuer.sign(&claims).unwrap();

        let result = gatekeeper().authenticate_at(CredentialKind::SignedToken(&token), t0());

        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_bypass_token_skips_verification() {
        let gate = gatekeeper();

        let credential = gate.classify_token("demo_anything");

        assert_eq!(credential, CredentialKind::BypassToken("demo_anything"));
        assert_eq!(
            gate.authenticate_at(credential, t0()).unwrap(),
            Authenticated::Bypass
        );
    }

    #[test]
    fn test_missing_signing_secret_fails_closed() {
        let gate = Gatekeeper::new(Some("dauns33"), Some("   "), DAY, BypassPolicy::disabled())
            .unwrap();

        assert_eq!(
            gate.misconfiguration(),
            Some("token signing secret is not configured")
        );
        assert!(matches!(
            gate.authenticate_at(CredentialKind::Password("dauns33"), t0()),
            Err(AuthError::Misconfigured(_))
        ));
        assert!(matches!(
            gate.authenticate_at(CredentialKind::SignedToken("a.b.c"), t0()),
            Err(AuthError::Misconfigured(_))
        ));
    }

    #[test]
    fn test_missing_admin_password_fails_closed() {
        let gate = Gatekeeper::new(None, Some("signing-key"), DAY, BypassPolicy::disabled())
            .unwrap();

        assert_eq!(gate.misconfiguration(), Some("admin password is not configured"));
        assert!(matches!(
            gate.authenticate_at(CredentialKind::Password(""), t0()),
            Err(AuthError::Misconfigured(_))
        ));
    }

    #[test]
    fn test_fully_configured() {
        assert_eq!(gatekeeper().misconfiguration(), None);
    }
}
