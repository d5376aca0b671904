//! Credential classification and comparison.

use subtle::ConstantTimeEq;

/// A credential presented to the gate, classified before any verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind<'a> {
    /// The shared admin password, submitted at login
    Password(&'a str),
    /// A token carrying the configured bypass prefix. Accepted without
    /// signature verification, so it needs its own access policy.
    BypassToken(&'a str),
    /// A token minted by the `TokenIssuer`
    SignedToken(&'a str),
}

impl<'a> CredentialKind<'a> {
    /// Classify a presented token against the bypass policy.
    pub fn from_token(token: &'a str, bypass: &BypassPolicy) -> Self {
        if bypass.matches(token) {
            CredentialKind::BypassToken(token)
        } else {
            CredentialKind::SignedToken(token)
        }
    }

    /// Short label for logs; never includes the credential itself.
    pub fn label(&self) -> &'static str {
        match self {
            CredentialKind::Password(_) => "password",
            CredentialKind::BypassToken(_) => "bypass_token",
            CredentialKind::SignedToken(_) => "signed_token",
        }
    }
}

/// Which tokens, if any, skip signature verification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BypassPolicy {
    prefix: Option<String>,
}

impl BypassPolicy {
    /// Bypass path switched off.
    pub fn disabled() -> Self {
        Self { prefix: None }
    }

    /// Treat tokens starting with `prefix` as pre-authenticated.
    ///
    /// An empty or whitespace-only prefix disables the bypass rather than
    /// matching every token.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        if prefix.trim().is_empty() {
            return Self::disabled();
        }
        Self {
            prefix: Some(prefix),
        }
    }

    /// Whether the bypass path is enabled.
    pub fn is_enabled(&self) -> bool {
        self.prefix.is_some()
    }

    /// Whether `token` takes the bypass path.
    pub fn matches(&self, token: &str) -> bool {
        self.prefix
            .as_deref()
            .is_some_and(|prefix| token.starts_with(prefix))
    }
}

/// Compare two secrets without an early exit on the first differing byte.
pub fn secrets_match(submitted: &str, expected: &str) -> bool {
    submitted.as_bytes().ct_eq(expected.as_bytes()).into()
}
