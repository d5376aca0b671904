//! HTTP surface: routing, shared state and the server.

mod cors;
mod extract;
mod handlers;
mod response;
mod server;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use tower_http::trace::TraceLayer;

pub use cors::cors_layer;
pub use extract::ClientAddr;
pub use handlers::{health_handler, login_handler, verify_handler};
pub use response::{LoginError, LoginResponse, VerifyError, VerifyResponse};
pub use server::HttpServer;

use crate::auth::{BypassPolicy, Gatekeeper};
use crate::config::{CorsConfig, PassgateConfig};
use crate::error::{PassgateError, Result};
use crate::ratelimit::{InMemoryAttemptStore, LimitPolicy, RateLimiter, SweepSchedule};

/// State shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub gatekeeper: Arc<Gatekeeper>,
    pub development: bool,
}

impl AppState {
    pub fn new(limiter: Arc<RateLimiter>, gatekeeper: Arc<Gatekeeper>, development: bool) -> Self {
        Self {
            limiter,
            gatekeeper,
            development,
        }
    }

    /// Build the state from loaded configuration, backed by an in-memory
    /// attempt store.
    pub fn from_config(config: &PassgateConfig) -> Result<Self> {
        let policy = LimitPolicy::new(
            config.rate_limiting.max_attempts,
            config.rate_limiting.window_ms,
        )?;
        let schedule = SweepSchedule::new(config.rate_limiting.sweep_interval(), Utc::now())?;
        let limiter = RateLimiter::new(Arc::new(InMemoryAttemptStore::new()), policy, schedule);

        let bypass = match config.auth.bypass_prefix.as_deref() {
            Some(prefix) => BypassPolicy::with_prefix(prefix),
            None => BypassPolicy::disabled(),
        };
        let gatekeeper = Gatekeeper::new(
            config.auth.admin_password.as_ref().map(|s| s.expose_secret()),
            config.auth.jwt_secret.as_ref().map(|s| s.expose_secret()),
            config.auth.token_ttl(),
            bypass,
        )
        .map_err(|e| PassgateError::Config(e.to_string()))?;

        Ok(Self::new(
            Arc::new(limiter),
            Arc::new(gatekeeper),
            config.server.development,
        ))
    }

    /// Misconfiguration detail for a response body, only in development mode.
    pub(crate) fn detail(&self, reason: &str) -> Option<String> {
        self.development.then(|| reason.to_string())
    }
}

/// Build the application router.
pub fn router(state: AppState, cors: &CorsConfig) -> Router {
    let cors = cors_layer(cors, state.development);

    Router::new()
        .route(
            "/auth/login",
            post(login_handler)
                .options(response::preflight)
                .fallback(response::method_not_allowed),
        )
        .route(
            "/auth/verify",
            post(verify_handler)
                .options(response::preflight)
                .fallback(response::method_not_allowed),
        )
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secret;

    #[tokio::test]
    async fn test_state_from_config() {
        let mut config = PassgateConfig::default();
        config.auth.admin_password = Some(Secret::new("dauns33"));
        config.auth.jwt_secret = Some(Secret::new("signing-key"));
        config.auth.bypass_prefix = Some("demo_".to_string());

        let state = AppState::from_config(&config).unwrap();

        assert_eq!(state.gatekeeper.misconfiguration(), None);
        assert_eq!(state.limiter.policy().max_attempts(), 5);
        assert!(!state.development);
        assert_eq!(state.gatekeeper.classify_token("demo_x").label(), "bypass_token");
    }

    #[tokio::test]
    async fn test_state_without_secrets_is_closed() {
        let state = AppState::from_config(&PassgateConfig::default()).unwrap();

        assert!(state.gatekeeper.misconfiguration().is_some());
        assert_eq!(state.detail("reason"), None);
    }
}
