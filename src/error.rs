//! Session and gateway errors.
//!
//! ERROR HANDLING
//! ==============
//! Every failure is representable as the uniform [`ApiError`] shape
//! (`message`, optional `code`, optional `details`) that UI callers render.
//! [`SessionError`] keeps the kind distinction the session logic branches on:
//! auth failures, transport failures that never reached a server, and server
//! responses with a non-2xx status.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::navigation::Navigation;

const GENERIC_NETWORK_MESSAGE: &str = "Network error";

// =============================================================================
// API ERROR
// =============================================================================

/// Normalized error shape propagated to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ApiError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), code: None, details: None }
    }

    /// Normalize a non-2xx response body.
    ///
    /// The message prefers `message`, then the OAuth-style `error_description`,
    /// then a string `error`. Bodies that are not JSON objects fall back to a
    /// status-derived message.
    #[must_use]
    pub fn from_body(status: u16, body: &Value) -> Self {
        let field = |key: &str| body.get(key).and_then(Value::as_str).map(str::to_owned);

        let message = field("message")
            .or_else(|| field("error_description"))
            .or_else(|| field("error"))
            .unwrap_or_else(|| format!("Request failed with status {status}"));
        let code = field("code").or_else(|| field("error"));
        let details = body.get("details").filter(|v| !v.is_null()).cloned();

        Self { message, code, details }
    }

    /// Generic shape for a request that never produced a response.
    #[must_use]
    pub fn network(err: &reqwest::Error) -> Self {
        let code = if err.is_timeout() { "ETIMEDOUT" } else { "ERR_NETWORK" };
        Self {
            message: GENERIC_NETWORK_MESSAGE.to_owned(),
            code: Some(code.to_owned()),
            details: Some(Value::String(err.to_string())),
        }
    }
}

// =============================================================================
// SESSION ERROR
// =============================================================================

/// Errors produced by the session holder, gateway, and their collaborators.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Invalid credentials, missing token, or a rejected refresh.
    #[error("{0}")]
    Auth(String),

    /// The request never reached a server.
    #[error("{}", .0.message)]
    Transport(ApiError),

    /// The server answered with a non-2xx status.
    #[error("{}", .error.message)]
    Server { status: u16, error: ApiError },

    /// A 401 could not be recovered by refreshing; the session was cleared.
    #[error("session expired: {cause}")]
    SessionExpired {
        #[source]
        cause: Box<SessionError>,
        navigation: Navigation,
    },

    /// A response body did not match the expected shape.
    #[error("invalid response body: {0}")]
    Decode(String),

    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    Config(String),

    /// Durable token storage could not be read or written.
    #[error("storage error: {0}")]
    Storage(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl SessionError {
    /// Stable machine-readable code for logs and UI branching.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Auth(_) => "E_AUTH",
            Self::Transport(_) => "E_TRANSPORT",
            Self::Server { .. } => "E_SERVER",
            Self::SessionExpired { .. } => "E_SESSION_EXPIRED",
            Self::Decode(_) => "E_DECODE",
            Self::Config(_) => "E_CONFIG_PARSE",
            Self::Storage(_) => "E_STORAGE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    /// HTTP status when the server produced one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            Self::SessionExpired { cause, .. } => cause.status(),
            _ => None,
        }
    }

    /// Re-authentication intent carried by an expired session.
    #[must_use]
    pub fn navigation(&self) -> Option<&Navigation> {
        match self {
            Self::SessionExpired { navigation, .. } => Some(navigation),
            _ => None,
        }
    }

    /// Reclassify a credential rejection (400/401/403) from an auth endpoint
    /// as [`SessionError::Auth`], keeping the server's message.
    #[must_use]
    pub fn into_auth_rejection(self) -> Self {
        match self {
            Self::Server { status: 400 | 401 | 403, error } => Self::Auth(error.message),
            other => other,
        }
    }

    /// Uniform `{message, code?, details?}` view of this error.
    #[must_use]
    pub fn api_error(&self) -> ApiError {
        match self {
            Self::Transport(error) | Self::Server { error, .. } => error.clone(),
            Self::SessionExpired { cause, .. } => cause.api_error(),
            other => ApiError { message: other.to_string(), code: Some(other.error_code().to_owned()), details: None },
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
