//! In-process mock of the Vault backend for integration tests.
//!
//! Serves the three auth endpoints plus a handful of resource routes under
//! `/api`. The set of accepted access tokens is controlled by the test, so a
//! token can be "expired" at any moment.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use vault_client::{ClientConfig, LoginRedirect, VaultClient};
use vault_storage::MemoryBackend;

pub const SESSION_KEY: &str = "vault/session";

#[derive(Debug)]
pub struct MockState {
    valid_token: Mutex<String>,
    next_token: Mutex<String>,
    refresh_token: Mutex<String>,
    rotate_to: Mutex<Option<String>>,
    refresh_fails: AtomicBool,
    refresh_malformed: AtomicBool,
    logout_fails: AtomicBool,
    refresh_delay: Mutex<Duration>,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub always_401_hits: AtomicUsize,
    seen_auth: Mutex<Vec<Option<String>>>,
}

impl MockState {
    /// Reject every access token currently in circulation.
    pub fn expire_tokens(&self) {
        *self.valid_token.lock().unwrap() = "nobody-has-this".to_owned();
    }

    pub fn set_valid_token(&self, token: &str) {
        *self.valid_token.lock().unwrap() = token.to_owned();
    }

    pub fn set_next_token(&self, token: &str) {
        *self.next_token.lock().unwrap() = token.to_owned();
    }

    /// Issue `token` as a rotated refresh token on the next refresh.
    pub fn rotate_refresh_token(&self, token: &str) {
        *self.rotate_to.lock().unwrap() = Some(token.to_owned());
    }

    /// Answer refreshes with 200 and a body that has no access token.
    pub fn malform_refresh(&self) {
        self.refresh_malformed.store(true, Ordering::SeqCst);
    }

    pub fn fail_refresh(&self) {
        self.refresh_fails.store(true, Ordering::SeqCst);
    }

    pub fn fail_logout(&self) {
        self.logout_fails.store(true, Ordering::SeqCst);
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = delay;
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// `Authorization` headers seen by the resource routes, in arrival order.
    pub fn seen_auth(&self) -> Vec<Option<String>> {
        self.seen_auth.lock().unwrap().clone()
    }

    fn record_auth(&self, headers: &HeaderMap) -> Option<String> {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        self.seen_auth.lock().unwrap().push(auth.clone());
        auth
    }

    fn is_valid(&self, auth: Option<&str>) -> bool {
        let valid = self.valid_token.lock().unwrap().clone();
        auth == Some(format!("Bearer {valid}").as_str())
    }
}

pub struct MockBackend {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(MockState {
            valid_token: Mutex::new("t1".to_owned()),
            next_token: Mutex::new("t2".to_owned()),
            refresh_token: Mutex::new("r1".to_owned()),
            rotate_to: Mutex::new(None),
            refresh_fails: AtomicBool::new(false),
            refresh_malformed: AtomicBool::new(false),
            logout_fails: AtomicBool::new(false),
            refresh_delay: Mutex::new(Duration::ZERO),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            always_401_hits: AtomicUsize::new(0),
            seen_auth: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/auth/refresh", post(refresh))
            .route("/api/auth/logout", post(logout))
            .route("/api/documents", get(documents))
            .route("/api/open", get(open))
            .route("/api/always-401", get(always_401))
            .route("/api/broken", get(broken))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(self.base_url())
    }
}

/// Counts login redirects.
#[derive(Debug, Default)]
pub struct RedirectCounter {
    hits: AtomicUsize,
}

impl RedirectCounter {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl LoginRedirect for RedirectCounter {
    fn redirect_to_login(&self, login_path: &str) {
        assert_eq!(login_path, "/login");
        self.hits.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub backend: MockBackend,
    pub storage: MemoryBackend,
    pub redirects: Arc<RedirectCounter>,
    pub client: VaultClient,
}

pub async fn harness() -> Harness {
    let backend = MockBackend::start().await;
    let storage = MemoryBackend::new();
    let redirects = Arc::new(RedirectCounter::default());
    let client = VaultClient::with_redirect(
        backend.config(),
        Arc::new(storage.clone()),
        redirects.clone(),
    )
    .unwrap();
    Harness {
        backend,
        storage,
        redirects,
        client,
    }
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn login(Json(body): Json<Value>) -> Response {
    let email = body.get("email").and_then(Value::as_str).unwrap_or_default();
    let password = body.get("password").and_then(Value::as_str).unwrap_or_default();
    if password != "x" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid credentials" })),
        )
            .into_response();
    }
    Json(json!({
        "accesstoken": "t1",
        "refreshtoken": "r1",
        "user": { "email": email, "roles": ["admin", "expert"] },
    }))
    .into_response()
}

async fn refresh(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let delay = *state.refresh_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    if state.refresh_fails.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "refresh unavailable" })),
        )
            .into_response();
    }
    if state.refresh_malformed.load(Ordering::SeqCst) {
        return Json(json!({ "user": {} })).into_response();
    }
    let expected = state.refresh_token.lock().unwrap().clone();
    if body.get("refreshtoken").and_then(Value::as_str) != Some(expected.as_str()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "bad refresh token" })),
        )
            .into_response();
    }

    let next = state.next_token.lock().unwrap().clone();
    state.set_valid_token(&next);
    match state.rotate_to.lock().unwrap().take() {
        Some(rotated) => {
            *state.refresh_token.lock().unwrap() = rotated.clone();
            Json(json!({ "accesstoken": next, "refreshtoken": rotated })).into_response()
        }
        None => Json(json!({ "accesstoken": next })).into_response(),
    }
}

async fn logout(State(state): State<Arc<MockState>>, headers: HeaderMap) -> StatusCode {
    state.logout_calls.fetch_add(1, Ordering::SeqCst);
    state.record_auth(&headers);
    if state.logout_fails.load(Ordering::SeqCst) {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::NO_CONTENT
    }
}

async fn documents(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    let auth = state.record_auth(&headers);
    if !state.is_valid(auth.as_deref()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "token expired" })),
        )
            .into_response();
    }
    Json(json!({ "items": ["contract.pdf", "invoice.pdf"], "auth": auth })).into_response()
}

async fn open(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Json<Value> {
    let auth = state.record_auth(&headers);
    Json(json!({ "auth": auth }))
}

async fn always_401(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.record_auth(&headers);
    state.always_401_hits.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "not for you" })),
    )
        .into_response()
}

async fn broken() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": { "message": "db down" } })),
    )
        .into_response()
}
