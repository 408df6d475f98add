//! HTTP gateway: the single wrapper around every outbound admin API call.
//!
//! DESIGN
//! ======
//! Every request carries `Authorization: Bearer <token>` when a token is set.
//! A 401 on the first attempt of a logical request triggers one refresh via
//! `POST /auth/refresh`, sent directly so its own 401 is never retried, and
//! then one replay of the original request with the new token. The replay's
//! result is final.
//!
//! If the refresh fails the gateway drops its token, tells the session via
//! [`TokenSink::session_expired`], and returns
//! [`SessionError::SessionExpired`] wrapping the refresh failure together
//! with the configured re-authentication [`Navigation`]. That intent returns
//! the user to the last location recorded with [`HttpGateway::set_location`].
//!
//! A 401 for a request whose token was cleared while it was in flight (the
//! user logged out, or another request expired the session) is final. No
//! refresh is attempted and nothing is written back, so a logout is never
//! undone by a late response.
//!
//! CONCURRENCY
//! ===========
//! Refreshes are serialized behind `refresh_lock`. A request that got a 401
//! with a token that has since been replaced reuses the replacement instead
//! of refreshing again, so concurrent 401s cost one refresh call. A refreshed
//! token is only installed if the token it replaces is still current.

mod request;

use std::sync::{Arc, PoisonError, RwLock};

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use request::{ApiResponse, PendingRequest};

use crate::config::SessionConfig;
use crate::error::{ApiError, SessionError};
use crate::navigation::{Navigation, RedirectStrategy};
use crate::session::TokenSink;

pub const REFRESH_PATH: &str = "/auth/refresh";
pub const HEALTH_PATH: &str = "/health";
const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(serde::Deserialize)]
struct RefreshResponse {
    access_token: String,
}

// =============================================================================
// GATEWAY
// =============================================================================

pub struct HttpGateway {
    http: reqwest::Client,
    base_url: String,
    bearer: RwLock<Option<String>>,
    refresh_lock: tokio::sync::Mutex<()>,
    sink: Option<Arc<dyn TokenSink>>,
    strategy: RedirectStrategy,
    app_origin: String,
    location: RwLock<Option<String>>,
}

impl HttpGateway {
    /// Standalone gateway with no session listening for token changes.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::HttpClientBuild`] if the HTTP client cannot be built.
    pub fn new(config: &SessionConfig) -> Result<Self, SessionError> {
        Self::build(config, None)
    }

    /// Gateway that reports autonomous token changes to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::HttpClientBuild`] if the HTTP client cannot be built.
    pub fn with_sink(config: &SessionConfig, sink: Arc<dyn TokenSink>) -> Result<Self, SessionError> {
        Self::build(config, Some(sink))
    }

    fn build(config: &SessionConfig, sink: Option<Arc<dyn TokenSink>>) -> Result<Self, SessionError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(config.timeouts.request)
            .connect_timeout(config.timeouts.connect)
            .default_headers(headers)
            .build()
            .map_err(|e| SessionError::HttpClientBuild(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.clone(),
            bearer: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
            sink,
            strategy: config.redirect.clone(),
            app_origin: config.app_origin.clone(),
            location: RwLock::new(None),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Replace the bearer token attached to subsequent requests.
    pub fn set_auth_token(&self, token: Option<String>) {
        *self.bearer.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    #[must_use]
    pub fn auth_token(&self) -> Option<String> {
        self.bearer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install `token` only if the current token is still `expected`.
    fn replace_token_if(&self, expected: Option<&str>, token: &str) -> bool {
        let mut bearer = self.bearer.write().unwrap_or_else(PoisonError::into_inner);
        if bearer.as_deref() != expected {
            return false;
        }
        *bearer = Some(token.to_owned());
        true
    }

    /// Record the route the user is on (path plus query). Re-authentication
    /// intents send the user back there.
    pub fn set_location(&self, location: Option<String>) {
        *self.location.write().unwrap_or_else(PoisonError::into_inner) = location;
    }

    /// Re-authentication intent for the recorded location.
    #[must_use]
    pub fn reauth_navigation(&self) -> Navigation {
        let location = self.location.read().unwrap_or_else(PoisonError::into_inner);
        self.strategy.reauthenticate(&self.app_origin, location.as_deref())
    }

    // =========================================================================
    // REQUEST PIPELINE
    // =========================================================================

    /// Issue `request`, refreshing and replaying once on a first-attempt 401.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Transport`] when no response was received.
    /// - [`SessionError::Server`] for any non-2xx response that is final.
    /// - [`SessionError::SessionExpired`] when the 401 refresh failed.
    pub async fn execute(&self, mut request: PendingRequest) -> Result<ApiResponse, SessionError> {
        let sent_with = self.auth_token();
        let response = self.dispatch(&request, sent_with.as_deref()).await?;

        if response.status != 401 || !request.refresh_on_unauthorized || request.retried {
            return check_status(response);
        }

        request.retried = true;
        let token = match self.refresh_after_unauthorized(sent_with.as_deref()).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::debug!(request_id = %request.id, path = %request.path, "session ended while request was in flight");
                return check_status(response);
            }
            Err(cause) => return Err(self.expire_session(cause)),
        };

        tracing::debug!(request_id = %request.id, path = %request.path, "replaying request after token refresh");
        let replay = self.dispatch(&request, Some(&token)).await?;
        check_status(replay)
    }

    async fn dispatch(&self, request: &PendingRequest, token: Option<&str>) -> Result<ApiResponse, SessionError> {
        tracing::debug!(
            method = %request.method,
            path = %request.path,
            request_id = %request.id,
            retried = request.retried,
            "outbound request"
        );

        let mut builder = self
            .http
            .request(request.method.clone(), self.url(&request.path))
            .header(REQUEST_ID_HEADER, request.id.to_string());
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SessionError::Transport(ApiError::network(&e)))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| SessionError::Transport(ApiError::network(&e)))?;

        Ok(ApiResponse { status, body: parse_body(text) })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_owned();
        }
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    // =========================================================================
    // REFRESH
    // =========================================================================

    /// Exchange the current token for a new one and attach it.
    ///
    /// Does not notify the sink; the session calls this itself and applies
    /// the result.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Auth`] when the refresh is rejected or the
    /// token was replaced or cleared meanwhile, or the transport/decode error
    /// that prevented it.
    pub async fn refresh(&self) -> Result<String, SessionError> {
        let _guard = self.refresh_lock.lock().await;
        let current = self.auth_token();
        let token = self.exchange_refresh(current.as_deref()).await?;
        if !self.replace_token_if(current.as_deref(), &token) {
            return Err(SessionError::Auth("session changed during refresh".to_owned()));
        }
        Ok(token)
    }

    /// Token to replay with after a 401 sent with `stale`, or `None` when
    /// the session ended while the request was in flight.
    async fn refresh_after_unauthorized(&self, stale: Option<&str>) -> Result<Option<String>, SessionError> {
        let _guard = self.refresh_lock.lock().await;

        match self.auth_token() {
            Some(current) if Some(current.as_str()) != stale => {
                tracing::debug!("token already replaced by a concurrent refresh");
                return Ok(Some(current));
            }
            None if stale.is_some() => return Ok(None),
            _ => {}
        }

        let token = match self.exchange_refresh(stale).await {
            Ok(token) => token,
            Err(e) if self.auth_token().as_deref() != stale => {
                tracing::debug!(error = %e, "refresh failed after the session changed; not expiring");
                return Ok(self.auth_token());
            }
            Err(e) => return Err(e),
        };
        if !self.replace_token_if(stale, &token) {
            tracing::debug!("session changed during refresh; discarding refreshed token");
            return Ok(self.auth_token());
        }
        if let Some(sink) = &self.sink {
            sink.token_refreshed(stale, &token);
        }
        tracing::info!("access token refreshed after 401");
        Ok(Some(token))
    }

    async fn exchange_refresh(&self, token: Option<&str>) -> Result<String, SessionError> {
        let request = PendingRequest::post(REFRESH_PATH).without_refresh();
        let response = self
            .dispatch(&request, token)
            .await
            .and_then(check_status)
            .map_err(SessionError::into_auth_rejection)?;
        let body: RefreshResponse = response.json()?;
        Ok(body.access_token)
    }

    fn expire_session(&self, cause: SessionError) -> SessionError {
        self.set_auth_token(None);
        if let Some(sink) = &self.sink {
            sink.session_expired();
        }
        let navigation = self.reauth_navigation();
        tracing::info!(error = %cause, %navigation, "token refresh failed; session cleared");
        SessionError::SessionExpired { cause: Box::new(cause), navigation }
    }

    // =========================================================================
    // VERB HELPERS
    // =========================================================================

    /// `GET path`, deserializing the response body.
    ///
    /// # Errors
    ///
    /// See [`HttpGateway::execute`]; also [`SessionError::Decode`].
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SessionError> {
        self.execute(PendingRequest::get(path)).await?.json()
    }

    /// `POST path` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`HttpGateway::execute`]; also [`SessionError::Decode`].
    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, SessionError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let request = PendingRequest::post(path).with_body(to_body(body)?);
        self.execute(request).await?.json()
    }

    /// `PUT path` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`HttpGateway::execute`]; also [`SessionError::Decode`].
    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, SessionError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let request = PendingRequest::put(path).with_body(to_body(body)?);
        self.execute(request).await?.json()
    }

    /// `PATCH path` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`HttpGateway::execute`]; also [`SessionError::Decode`].
    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T, SessionError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let request = PendingRequest::patch(path).with_body(to_body(body)?);
        self.execute(request).await?.json()
    }

    /// `DELETE path`.
    ///
    /// # Errors
    ///
    /// See [`HttpGateway::execute`]; also [`SessionError::Decode`].
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, SessionError> {
        self.execute(PendingRequest::delete(path)).await?.json()
    }

    /// `true` when `GET /health` answers 2xx.
    pub async fn health_check(&self) -> bool {
        self.execute(PendingRequest::get(HEALTH_PATH).without_refresh())
            .await
            .is_ok()
    }
}

fn check_status(response: ApiResponse) -> Result<ApiResponse, SessionError> {
    if response.is_success() {
        return Ok(response);
    }
    let error = ApiError::from_body(response.status, &response.body);
    Err(SessionError::Server { status: response.status, error })
}

fn parse_body(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

fn to_body<B: Serialize + ?Sized>(body: &B) -> Result<Value, SessionError> {
    serde_json::to_value(body).map_err(|e| SessionError::Decode(e.to_string()))
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
