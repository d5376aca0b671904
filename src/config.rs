//! Configuration management for Passgate.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use tracing::info;

use crate::auth::DEFAULT_TOKEN_TTL_SECS;
use crate::error::{PassgateError, Result};
use crate::ratelimit::{DEFAULT_MAX_ATTEMPTS, DEFAULT_SWEEP_INTERVAL_SECS, DEFAULT_WINDOW_MS};

/// Environment variable holding the admin password.
pub const ADMIN_PASSWORD_ENV: &str = "ADMIN_PASSWORD";
/// Environment variable holding the token signing secret.
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";
/// Environment variable holding the comma separated CORS allow-list.
pub const ALLOWED_ORIGINS_ENV: &str = "ALLOWED_ORIGINS";
/// Prefix for structured environment overrides (`PASSGATE__SECTION__KEY`).
pub const ENV_PREFIX: &str = "PASSGATE";

/// Longest accepted token lifetime (one year).
const MAX_TOKEN_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Main configuration for the Passgate service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PassgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Credential and token configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Cross-origin configuration
    #[serde(default)]
    pub cors: CorsConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Development mode: configuration detail in 500 bodies and relaxed CORS
    #[serde(default)]
    pub development: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            development: false,
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Credential and token configuration.
///
/// Secrets have no defaults. When one is missing the service still starts,
/// and the endpoints answer with a server configuration error.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Password compared against login submissions
    #[serde(default)]
    pub admin_password: Option<Secret>,

    /// Token signing key
    #[serde(default)]
    pub jwt_secret: Option<Secret>,

    /// Lifetime of issued tokens in seconds
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    /// Tokens starting with this prefix skip signature verification
    #[serde(default)]
    pub bypass_prefix: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_password: None,
            jwt_secret: None,
            token_ttl_secs: default_token_ttl(),
            bypass_prefix: None,
        }
    }
}

impl AuthConfig {
    /// Token lifetime as a `Duration`.
    pub fn token_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.token_ttl_secs)
    }
}

fn default_token_ttl() -> u64 {
    DEFAULT_TOKEN_TTL_SECS
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitingConfig {
    /// Login attempts admitted per window
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Minimum spacing between sweeps of stale records in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            window_ms: default_window_ms(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl RateLimitingConfig {
    /// Sweep spacing as a `Duration`.
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_window_ms() -> u64 {
    DEFAULT_WINDOW_MS
}

fn default_sweep_interval() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

/// Cross-origin configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed to call the API
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// A configured secret. `Debug` never prints the value.
#[derive(Clone)]
pub struct Secret(SecretString);

impl Secret {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::new(value.into().into_boxed_str()))
    }

    /// Expose the secret value.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"[REDACTED]\"")
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(Secret::new(value))
    }
}

impl PassgateConfig {
    /// Load configuration from an optional file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, std::env::vars().collect())
    }

    /// Load configuration from an optional file and an environment snapshot.
    ///
    /// Later sources win: the file, then `PASSGATE__SECTION__KEY` variables,
    /// then `ADMIN_PASSWORD`, `JWT_SECRET` and `ALLOWED_ORIGINS`.
    pub fn load_with_env(path: Option<&Path>, env: HashMap<String, String>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(env.clone())),
            )
            .set_override_option("auth.admin_password", env.get(ADMIN_PASSWORD_ENV).cloned())?
            .set_override_option("auth.jwt_secret", env.get(JWT_SECRET_ENV).cloned())?
            .set_override_option(
                "cors.allowed_origins",
                env.get(ALLOWED_ORIGINS_ENV).map(|origins| split_origins(origins)),
            )?;

        let config: PassgateConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PassgateConfig = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.max_attempts == 0 {
            return Err(PassgateError::Config(
                "rate_limiting.max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.rate_limiting.window_ms == 0 {
            return Err(PassgateError::Config(
                "rate_limiting.window_ms must be greater than 0".to_string(),
            ));
        }
        if self.rate_limiting.sweep_interval_secs == 0 {
            return Err(PassgateError::Config(
                "rate_limiting.sweep_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.auth.token_ttl_secs == 0 || self.auth.token_ttl_secs > MAX_TOKEN_TTL_SECS {
            return Err(PassgateError::Config(format!(
                "auth.token_ttl_secs must be between 1 and {}",
                MAX_TOKEN_TTL_SECS
            )));
        }
        for origin in &self.cors.allowed_origins {
            if axum::http::HeaderValue::from_str(origin).is_err() {
                return Err(PassgateError::Config(format!(
                    "cors.allowed_origins contains an invalid origin: {}",
                    origin
                )));
            }
        }
        Ok(())
    }
}

fn split_origins(origins: &str) -> Vec<String> {
    origins
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}
