//! Session state holder: bearer token, user profile, and auth predicates.
//!
//! DESIGN
//! ======
//! `Session` is constructed explicitly and cloned into whatever needs it; it
//! is not a process global. State lives in a `tokio::sync::watch` channel so
//! guards can await a settled state instead of polling a loading flag.
//!
//! The token is hydrated from durable storage at construction and pushed to
//! the gateway on every change. When the gateway refreshes or drops the token
//! on its own, it reports through [`TokenSink`], which keeps session state,
//! durable storage, and the gateway in step.
//!
//! Invariant: token and user are cleared together.
//!
//! CONCURRENCY
//! ===========
//! Every sign-out or identity change bumps an epoch. An auth check or
//! explicit refresh that started under an older epoch does not write its
//! result back, so a logout that lands while one is in flight stays a
//! logout. Logins and auth checks are counted; `loading` stays set until
//! the last of them finishes.

mod state;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;

pub use state::{ADMIN_ALL, SessionState, UserProfile};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::gateway::{HttpGateway, PendingRequest};
use crate::storage::DurableStore;

pub const LOGIN_PATH: &str = "/auth/login";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const ME_PATH: &str = "/api/auth/me";
/// Query parameter the external auth service uses to hand back a token.
pub const CALLBACK_TOKEN_PARAM: &str = "token";

/// Receiver for token changes the gateway makes without being asked.
pub trait TokenSink: Send + Sync {
    /// A 401 sent with `previous` was recovered with `token`.
    fn token_refreshed(&self, previous: Option<&str>, token: &str);
    /// A 401 could not be recovered; the session is over.
    fn session_expired(&self);
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: Option<String>,
    user: Option<UserProfile>,
    #[serde(default)]
    requires_mfa: bool,
    error_description: Option<String>,
}

// =============================================================================
// SHARED STATE
// =============================================================================

struct SessionShared {
    state: watch::Sender<SessionState>,
    store: Arc<dyn DurableStore>,
    token_key: String,
    epoch: AtomicU64,
    in_flight: AtomicUsize,
}

impl SessionShared {
    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn bump_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    fn begin_loading(&self) {
        self.state.send_modify(|s| {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            s.loading = true;
        });
    }

    /// Apply `finish` and drop this operation from the in-flight count in
    /// one state change.
    fn end_loading(&self, finish: impl FnOnce(&mut SessionState)) {
        self.state.send_modify(|s| {
            finish(s);
            s.loading = self.in_flight.fetch_sub(1, Ordering::SeqCst) > 1;
        });
    }

    fn persist(&self, token: Option<&str>) {
        let result = match token {
            Some(token) => self.store.set(&self.token_key, token),
            None => self.store.remove(&self.token_key),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, key = %self.token_key, "durable token write failed");
        }
    }
}

impl TokenSink for SessionShared {
    fn token_refreshed(&self, previous: Option<&str>, token: &str) {
        let applied = self.state.send_if_modified(|s| {
            if s.token.as_deref() != previous {
                return false;
            }
            s.token = Some(token.to_owned());
            true
        });
        if applied {
            self.persist(Some(token));
        } else {
            tracing::debug!("refreshed token arrived after the session changed; dropped");
        }
    }

    fn session_expired(&self) {
        self.bump_epoch();
        self.persist(None);
        self.state.send_modify(|s| {
            s.token = None;
            s.user = None;
        });
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Authenticated-session context. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Session {
    shared: Arc<SessionShared>,
    gateway: Arc<HttpGateway>,
}

impl Session {
    /// Build a session and its gateway, hydrating the token from `store`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::HttpClientBuild`] if the gateway cannot be built.
    pub fn new(config: &SessionConfig, store: Arc<dyn DurableStore>) -> Result<Self, SessionError> {
        let token = store.get(&config.token_key);
        let (state, _) = watch::channel(SessionState { token: token.clone(), user: None, loading: false });
        let shared = Arc::new(SessionShared {
            state,
            store,
            token_key: config.token_key.clone(),
            epoch: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
        });

        let sink: Arc<dyn TokenSink> = shared.clone();
        let gateway = Arc::new(HttpGateway::with_sink(config, sink)?);
        gateway.set_auth_token(token);

        Ok(Self { shared, gateway })
    }

    /// Gateway for CRUD callers; it carries this session's token.
    #[must_use]
    pub fn gateway(&self) -> &Arc<HttpGateway> {
        &self.gateway
    }

    // =========================================================================
    // READ SIDE
    // =========================================================================

    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.shared.state.borrow().clone()
    }

    /// Subscribe to every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.shared.state.borrow().token.clone()
    }

    #[must_use]
    pub fn user(&self) -> Option<UserProfile> {
        self.shared.state.borrow().user.clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.shared.state.borrow().loading
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.shared.state.borrow().is_authenticated()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.shared.state.borrow().is_admin()
    }

    #[must_use]
    pub fn admin_orgs(&self) -> Vec<String> {
        self.shared.state.borrow().admin_orgs()
    }

    #[must_use]
    pub fn has_admin_access(&self, org_id: Option<&str>) -> bool {
        self.shared.state.borrow().has_admin_access(org_id)
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.shared.state.borrow().has_role(role)
    }

    /// Resolve once no login or auth check is in flight.
    pub async fn wait_until_settled(&self) {
        let mut rx = self.shared.state.subscribe();
        // `self` holds the sender, so the channel cannot close while we wait.
        let _ = rx.wait_for(|s| !s.loading).await;
    }

    // =========================================================================
    // WRITE SIDE
    // =========================================================================

    fn apply_token(&self, token: Option<String>) {
        self.shared.persist(token.as_deref());
        self.gateway.set_auth_token(token.clone());
        self.shared.state.send_modify(|s| s.token = token);
    }

    fn clear(&self) {
        self.shared.bump_epoch();
        self.shared.persist(None);
        self.gateway.set_auth_token(None);
        self.shared.state.send_modify(|s| {
            s.token = None;
            s.user = None;
        });
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Auth`] for rejected credentials; the message is the
    ///   server's description (e.g. `invalid_grant`). An unreachable auth
    ///   service is also reported as `Auth`, with the generic network message.
    /// - [`SessionError::Server`] for other non-2xx answers.
    ///
    /// On any error token and user are both left unset.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, SessionError> {
        self.shared.begin_loading();
        let result = self.login_inner(email, password).await;
        match &result {
            Ok(user) => tracing::info!(user_id = %user.id, "login succeeded"),
            Err(e) => {
                self.clear();
                tracing::warn!(error = %e, "login failed");
            }
        }
        self.shared.end_loading(|_| {});
        result
    }

    async fn login_inner(&self, email: &str, password: &str) -> Result<UserProfile, SessionError> {
        let request = PendingRequest::post(LOGIN_PATH)
            .with_body(json!({ "email": email, "password": password }))
            .without_refresh();
        let response = self.gateway.execute(request).await.map_err(login_failure)?;
        let login: LoginResponse = response.json()?;

        if login.requires_mfa {
            return Err(SessionError::Auth("multi-factor authentication required".to_owned()));
        }
        let Some(token) = login.access_token.filter(|t| !t.is_empty()) else {
            let message = login
                .error_description
                .unwrap_or_else(|| "invalid credentials".to_owned());
            return Err(SessionError::Auth(message));
        };
        self.shared.bump_epoch();
        self.apply_token(Some(token));

        let user = match login.user {
            Some(user) => user,
            None => self.fetch_me().await.map_err(login_failure)?,
        };
        self.shared.state.send_modify(|s| s.user = Some(user.clone()));
        Ok(user)
    }

    /// End the session. The server call is best effort; local state is
    /// always cleared.
    pub async fn logout(&self) {
        if self.token().is_some() {
            let request = PendingRequest::post(LOGOUT_PATH).without_refresh();
            if let Err(e) = self.gateway.execute(request).await {
                tracing::warn!(error = %e, "logout request failed");
            }
        }
        self.clear();
        tracing::info!("session cleared");
    }

    /// Validate the held token and load the user. No-op without a token.
    ///
    /// Any failure invalidates the session: token and user are cleared and
    /// the caller sees an unauthenticated state rather than an error. A
    /// result that arrives after the session was ended or replaced is
    /// dropped.
    pub async fn check_auth(&self) {
        if self.token().is_none() {
            return;
        }

        let epoch = self.shared.epoch();
        self.shared.begin_loading();
        let result = self.fetch_me().await;
        if let Err(e) = &result {
            if self.shared.epoch() == epoch {
                tracing::warn!(error = %e, "auth check failed");
                self.clear();
            } else {
                tracing::debug!(error = %e, "auth check outlived its session");
            }
        }

        let shared = &self.shared;
        shared.end_loading(|s| {
            if let Ok(user) = result {
                if shared.epoch() == epoch && s.token.is_some() {
                    s.user = Some(user);
                } else {
                    tracing::debug!("auth check outlived its session; user dropped");
                }
            }
        });
    }

    async fn fetch_me(&self) -> Result<UserProfile, SessionError> {
        self.gateway
            .execute(PendingRequest::get(ME_PATH))
            .await?
            .json()
    }

    /// Exchange the held token for a new one.
    ///
    /// # Errors
    ///
    /// Returns `Auth("no token")` when signed out. Any refresh failure clears
    /// the session and is returned. A logout during the refresh wins: the new
    /// token is discarded and `Auth` is returned.
    pub async fn refresh_token(&self) -> Result<(), SessionError> {
        if self.token().is_none() {
            return Err(SessionError::Auth("no token".to_owned()));
        }

        let epoch = self.shared.epoch();
        match self.gateway.refresh().await {
            Ok(_) if self.shared.epoch() != epoch => Err(SessionError::Auth("session ended during refresh".to_owned())),
            Ok(token) => {
                self.apply_token(Some(token));
                Ok(())
            }
            Err(e) => {
                if self.shared.epoch() == epoch {
                    self.clear();
                }
                Err(e)
            }
        }
    }

    /// Adopt the token the external auth service appended to a callback URL.
    ///
    /// Returns the callback URL with the token parameter removed, ready to be
    /// navigated to.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Decode`] for an unparsable URL.
    /// - [`SessionError::Auth`] when the URL carries no token or the token
    ///   does not validate.
    pub async fn adopt_callback_token(&self, callback_url: &str) -> Result<String, SessionError> {
        let mut url =
            reqwest::Url::parse(callback_url).map_err(|e| SessionError::Decode(format!("invalid callback URL: {e}")))?;

        let token = url
            .query_pairs()
            .find(|(k, _)| k == CALLBACK_TOKEN_PARAM)
            .map(|(_, v)| v.into_owned())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SessionError::Auth("callback URL carries no token".to_owned()))?;

        let remaining: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != CALLBACK_TOKEN_PARAM)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if remaining.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(remaining);
        }

        self.apply_token(Some(token));
        self.check_auth().await;
        if !self.is_authenticated() {
            return Err(SessionError::Auth("callback token rejected".to_owned()));
        }
        Ok(url.to_string())
    }
}

/// Failure of a login round trip as the caller should see it: credential
/// rejections and an unreachable auth service are both `Auth`.
fn login_failure(err: SessionError) -> SessionError {
    match err.into_auth_rejection() {
        SessionError::Transport(api) => SessionError::Auth(api.message),
        other => other,
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
