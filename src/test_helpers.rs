//! In-process mock of the admin/auth service.
//!
//! One valid bearer token at a time. `/auth/refresh` rotates it to the
//! configured next token. Counters and recorded headers let tests assert
//! how many calls the session layer made and with which credentials.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, header::AUTHORIZATION};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use crate::config::SessionConfig;
use crate::navigation::RedirectStrategy;
use crate::session::TokenSink;

pub const EMAIL: &str = "a@b.com";
pub const PASSWORD: &str = "secret";
pub const INITIAL_TOKEN: &str = "abc";
pub const REFRESHED_TOKEN: &str = "xyz";

#[derive(Clone)]
pub struct MockAuth {
    inner: Arc<MockInner>,
}

struct MockInner {
    valid_token: Mutex<String>,
    next_token: Mutex<String>,
    refresh_fails: AtomicBool,
    logout_fails: AtomicBool,
    login_omits_user: AtomicBool,
    resource_rejects_all: AtomicBool,
    login_delay_ms: AtomicU64,
    me_delay_ms: AtomicU64,
    resource_delay_ms: AtomicU64,
    refresh_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    me_calls: AtomicUsize,
    resource_calls: AtomicUsize,
    resource_auth: Mutex<Vec<Option<String>>>,
    resource_request_ids: Mutex<Vec<Option<String>>>,
    resource_content_types: Mutex<Vec<Option<String>>>,
}

impl MockAuth {
    fn new() -> Self {
        Self {
            inner: Arc::new(MockInner {
                valid_token: Mutex::new(INITIAL_TOKEN.to_owned()),
                next_token: Mutex::new(REFRESHED_TOKEN.to_owned()),
                refresh_fails: AtomicBool::new(false),
                logout_fails: AtomicBool::new(false),
                login_omits_user: AtomicBool::new(false),
                resource_rejects_all: AtomicBool::new(false),
                login_delay_ms: AtomicU64::new(0),
                me_delay_ms: AtomicU64::new(0),
                resource_delay_ms: AtomicU64::new(0),
                refresh_calls: AtomicUsize::new(0),
                logout_calls: AtomicUsize::new(0),
                me_calls: AtomicUsize::new(0),
                resource_calls: AtomicUsize::new(0),
                resource_auth: Mutex::new(Vec::new()),
                resource_request_ids: Mutex::new(Vec::new()),
                resource_content_types: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Invalidate the current token server-side; refresh still works.
    pub fn expire_current(&self) {
        *lock(&self.inner.valid_token) = String::new();
    }

    pub fn fail_refresh(&self) {
        self.inner.refresh_fails.store(true, Ordering::SeqCst);
    }

    pub fn fail_logout(&self) {
        self.inner.logout_fails.store(true, Ordering::SeqCst);
    }

    pub fn omit_user_on_login(&self) {
        self.inner.login_omits_user.store(true, Ordering::SeqCst);
    }

    pub fn reject_all_resources(&self) {
        self.inner.resource_rejects_all.store(true, Ordering::SeqCst);
    }

    /// Hold `/auth/login` responses for `ms` milliseconds.
    pub fn delay_login(&self, ms: u64) {
        self.inner.login_delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn delay_me(&self, ms: u64) {
        self.inner.me_delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn delay_resource(&self, ms: u64) {
        self.inner.resource_delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn refresh_calls(&self) -> usize {
        self.inner.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.inner.logout_calls.load(Ordering::SeqCst)
    }

    pub fn me_calls(&self) -> usize {
        self.inner.me_calls.load(Ordering::SeqCst)
    }

    pub fn resource_calls(&self) -> usize {
        self.inner.resource_calls.load(Ordering::SeqCst)
    }

    /// `Authorization` headers seen by `/resource`, in arrival order.
    pub fn resource_auth(&self) -> Vec<Option<String>> {
        lock(&self.inner.resource_auth).clone()
    }

    pub fn resource_request_ids(&self) -> Vec<Option<String>> {
        lock(&self.inner.resource_request_ids).clone()
    }

    pub fn resource_content_types(&self) -> Vec<Option<String>> {
        lock(&self.inner.resource_content_types).clone()
    }

    fn is_valid(&self, headers: &HeaderMap) -> bool {
        let valid = lock(&self.inner.valid_token).clone();
        !valid.is_empty() && bearer(headers).as_deref() == Some(valid.as_str())
    }
}

async fn pause(delay_ms: &AtomicU64) {
    let ms = delay_ms.load(Ordering::SeqCst);
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned)
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

pub fn sample_user() -> Value {
    json!({
        "id": "u1",
        "email": EMAIL,
        "first_name": "Ada",
        "last_name": "Lovelace",
        "org": "org-1",
        "admin": ["org-1"],
        "roles": ["user-admin"]
    })
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "message": "unauthorized" }))).into_response()
}

// =============================================================================
// HANDLERS
// =============================================================================

async fn login(State(mock): State<MockAuth>, Json(body): Json<Value>) -> Response {
    pause(&mock.inner.login_delay_ms).await;
    let ok = body.get("email").and_then(Value::as_str) == Some(EMAIL)
        && body.get("password").and_then(Value::as_str) == Some(PASSWORD);
    if !ok {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_grant", "error_description": "invalid_grant" })),
        )
            .into_response();
    }

    let token = lock(&mock.inner.valid_token).clone();
    if mock.inner.login_omits_user.load(Ordering::SeqCst) {
        return Json(json!({ "success": true, "access_token": token })).into_response();
    }
    Json(json!({ "access_token": token, "user": sample_user() })).into_response()
}

async fn refresh(State(mock): State<MockAuth>, headers: HeaderMap) -> Response {
    mock.inner.refresh_calls.fetch_add(1, Ordering::SeqCst);
    if mock.inner.refresh_fails.load(Ordering::SeqCst) || bearer(&headers).is_none() {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "refresh rejected" }))).into_response();
    }
    let next = lock(&mock.inner.next_token).clone();
    *lock(&mock.inner.valid_token) = next.clone();
    Json(json!({ "access_token": next })).into_response()
}

async fn logout(State(mock): State<MockAuth>) -> Response {
    mock.inner.logout_calls.fetch_add(1, Ordering::SeqCst);
    if mock.inner.logout_fails.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "message": "logout unavailable" }))).into_response();
    }
    Json(json!({ "success": true })).into_response()
}

async fn me(State(mock): State<MockAuth>, headers: HeaderMap) -> Response {
    mock.inner.me_calls.fetch_add(1, Ordering::SeqCst);
    pause(&mock.inner.me_delay_ms).await;
    if !mock.is_valid(&headers) {
        return unauthorized();
    }
    Json(sample_user()).into_response()
}

async fn resource(State(mock): State<MockAuth>, headers: HeaderMap) -> Response {
    mock.inner.resource_calls.fetch_add(1, Ordering::SeqCst);
    lock(&mock.inner.resource_auth).push(header(&headers, "authorization"));
    lock(&mock.inner.resource_request_ids).push(header(&headers, "x-request-id"));
    lock(&mock.inner.resource_content_types).push(header(&headers, "content-type"));
    pause(&mock.inner.resource_delay_ms).await;

    if mock.inner.resource_rejects_all.load(Ordering::SeqCst) || !mock.is_valid(&headers) {
        return unauthorized();
    }
    Json(json!({ "value": 42, "token": bearer(&headers) })).into_response()
}

async fn boom() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": "exploded", "code": "E_BOOM", "details": { "trace": "t-1" } })),
    )
        .into_response()
}

async fn echo(method: Method, body: String) -> Json<Value> {
    let body: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    Json(json!({ "method": method.as_str(), "body": body }))
}

async fn no_content() -> StatusCode {
    StatusCode::NO_CONTENT
}

// =============================================================================
// SPAWN
// =============================================================================

/// Start the mock on an ephemeral port. Returns its base URL.
pub async fn spawn() -> (String, MockAuth) {
    let mock = MockAuth::new();
    let app = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .route("/resource", get(resource))
        .route("/boom", get(boom))
        .route("/items", any(echo))
        .route("/empty", any(no_content))
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .with_state(mock.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), mock)
}

/// Base URL of a port nothing listens on.
pub async fn unreachable_base() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Config pointed at `base` using the in-app login route.
pub fn internal_config(base: &str) -> SessionConfig {
    SessionConfig::new(base).with_redirect(RedirectStrategy::InternalLogin { login_path: "/login".into() })
}

// =============================================================================
// RECORDING SINK
// =============================================================================

#[derive(Default)]
pub struct RecordingSink {
    pub refreshed: Mutex<Vec<String>>,
    pub expired: AtomicUsize,
}

impl RecordingSink {
    pub fn refreshed(&self) -> Vec<String> {
        lock(&self.refreshed).clone()
    }

    pub fn expired(&self) -> usize {
        self.expired.load(Ordering::SeqCst)
    }
}

impl TokenSink for RecordingSink {
    fn token_refreshed(&self, _previous: Option<&str>, token: &str) {
        lock(&self.refreshed).push(token.to_owned());
    }

    fn session_expired(&self) {
        self.expired.fetch_add(1, Ordering::SeqCst);
    }
}
