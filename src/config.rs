//! Session configuration parsed from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::SessionError;
use crate::navigation::RedirectStrategy;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8444";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_TOKEN_KEY: &str = "auth_token";
pub const DEFAULT_TOKEN_STORE_PATH: &str = ".admin-session.json";
pub const DEFAULT_AUTH_SERVICE_URL: &str = "https://localhost:8443";
pub const DEFAULT_APP_ORIGIN: &str = "http://localhost:8444";
pub const DEFAULT_LOGIN_PATH: &str = "/login";
pub const DEFAULT_LANDING_PATH: &str = "/dashboard";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request: Duration,
    pub connect: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Base address every gateway path is joined onto, without trailing `/`.
    pub api_base_url: String,
    pub timeouts: Timeouts,
    /// Durable storage key holding the raw bearer token.
    pub token_key: String,
    /// JSON file backing the CLI's durable store.
    pub token_store_path: PathBuf,
    pub redirect: RedirectStrategy,
    /// Origin of the admin app, used to build absolute callback URLs.
    pub app_origin: String,
    pub login_path: String,
    pub landing_path: String,
}

impl SessionConfig {
    /// Config with defaults for everything but the API base address.
    #[must_use]
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: trim_base(&api_base_url.into()),
            timeouts: Timeouts::default(),
            token_key: DEFAULT_TOKEN_KEY.to_owned(),
            token_store_path: PathBuf::from(DEFAULT_TOKEN_STORE_PATH),
            redirect: RedirectStrategy::ExternalService { service_url: DEFAULT_AUTH_SERVICE_URL.to_owned() },
            app_origin: DEFAULT_APP_ORIGIN.to_owned(),
            login_path: DEFAULT_LOGIN_PATH.to_owned(),
            landing_path: DEFAULT_LANDING_PATH.to_owned(),
        }
    }

    /// Build typed session config from environment variables.
    ///
    /// Optional:
    /// - `ADMIN_API_BASE_URL`: default `http://localhost:8444`
    /// - `ADMIN_API_TIMEOUT_SECS`: default 10
    /// - `ADMIN_API_CONNECT_TIMEOUT_SECS`: default 5
    /// - `ADMIN_TOKEN_KEY`: default `auth_token`
    /// - `ADMIN_TOKEN_STORE`: default `.admin-session.json`
    /// - `AUTH_REDIRECT_STRATEGY`: `external` (default) or `internal`
    /// - `AUTH_SERVICE_URL`: default `https://localhost:8443`
    /// - `ADMIN_APP_ORIGIN`: default `http://localhost:8444`
    /// - `ADMIN_LOGIN_PATH` / `ADMIN_LANDING_PATH`: default `/login` / `/dashboard`
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] for an unknown redirect strategy.
    pub fn from_env() -> Result<Self, SessionError> {
        let api_base_url = trim_base(&env_or("ADMIN_API_BASE_URL", DEFAULT_API_BASE_URL));
        let timeouts = Timeouts {
            request: Duration::from_secs(env_parse_u64("ADMIN_API_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)),
            connect: Duration::from_secs(env_parse_u64("ADMIN_API_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)),
        };
        let login_path = env_or("ADMIN_LOGIN_PATH", DEFAULT_LOGIN_PATH);
        let redirect = parse_strategy(
            std::env::var("AUTH_REDIRECT_STRATEGY").ok().as_deref(),
            &env_or("AUTH_SERVICE_URL", DEFAULT_AUTH_SERVICE_URL),
            &login_path,
        )?;

        Ok(Self {
            api_base_url,
            timeouts,
            token_key: env_or("ADMIN_TOKEN_KEY", DEFAULT_TOKEN_KEY),
            token_store_path: PathBuf::from(env_or("ADMIN_TOKEN_STORE", DEFAULT_TOKEN_STORE_PATH)),
            redirect,
            app_origin: trim_base(&env_or("ADMIN_APP_ORIGIN", DEFAULT_APP_ORIGIN)),
            login_path,
            landing_path: env_or("ADMIN_LANDING_PATH", DEFAULT_LANDING_PATH),
        })
    }

    #[must_use]
    pub fn with_redirect(mut self, redirect: RedirectStrategy) -> Self {
        self.redirect = redirect;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

fn trim_base(raw: &str) -> String {
    raw.trim_end_matches('/').to_owned()
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_strategy(raw: Option<&str>, service_url: &str, login_path: &str) -> Result<RedirectStrategy, SessionError> {
    match raw.map_or("external", str::trim) {
        "external" => Ok(RedirectStrategy::ExternalService { service_url: trim_base(service_url) }),
        "internal" => Ok(RedirectStrategy::InternalLogin { login_path: login_path.to_owned() }),
        other => Err(SessionError::Config(format!(
            "unknown AUTH_REDIRECT_STRATEGY '{other}' (expected 'external' or 'internal')"
        ))),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
