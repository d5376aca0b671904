//! Credential checks and token issuance.

mod credential;
mod gatekeeper;
mod token;

pub use credential::{secrets_match, BypassPolicy, CredentialKind};
pub use gatekeeper::{AuthError, Authenticated, Gatekeeper};
pub use token::{AuthClaims, TokenError, TokenIssuer, DEFAULT_TOKEN_TTL_SECS};
