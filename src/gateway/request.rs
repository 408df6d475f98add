//! Request and response values passed through the gateway.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::error::SessionError;

/// One logical outbound call, kept intact so it can be replayed once.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    /// Correlation id sent as `x-request-id`; the replay reuses it.
    pub id: Uuid,
    pub method: Method,
    /// Path joined onto the gateway base address, or an absolute URL.
    pub path: String,
    pub body: Option<Value>,
    /// Whether a 401 may trigger the refresh-and-replay path.
    pub refresh_on_unauthorized: bool,
    /// Set once the single replay has been issued.
    pub retried: bool,
}

impl PendingRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            path: path.into(),
            body: None,
            refresh_on_unauthorized: true,
            retried: false,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Let a 401 propagate as-is. Used for the auth endpoints themselves.
    #[must_use]
    pub fn without_refresh(mut self) -> Self {
        self.refresh_on_unauthorized = false;
        self
    }
}

/// A completed response. The body is `Null` when the server sent none.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the body into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Decode`] if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, SessionError> {
        serde_json::from_value(self.body).map_err(|e| SessionError::Decode(e.to_string()))
    }
}
