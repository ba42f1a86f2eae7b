//! In-process fake of the AcadWorld API used by the integration tests.
//! Requests are answered from a small amount of mutable state so tests can
//! expire tokens, hold the refresh endpoint open and count calls.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Notify;

use acadworld_client::config::EndpointPaths;
use acadworld_client::error::TransportError;
use acadworld_client::identity::SessionContext;
use acadworld_client::pipeline::{AuthenticatedClient, HttpRefreshBackend, RefreshCoordinator};
use acadworld_client::storage::{MemoryTokenStore, SharedTokenStore, TokenPair};
use acadworld_client::transport::{ApiRequest, ApiResponse, HttpTransport};

pub const PASSWORD: &str = "correct-horse";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// New access token, refresh token kept.
    Grant,
    /// New access and refresh token.
    Rotate,
    /// Refresh token rejected with 401.
    Reject,
    /// Refresh endpoint unreachable.
    Offline,
}

pub struct FakeApi {
    paths: EndpointPaths,
    /// The only access token the protected endpoints accept.
    pub valid_access: Mutex<String>,
    pub refresh_mode: Mutex<RefreshMode>,
    /// User JSON returned by login and `auth/me/`.
    pub user: Mutex<Value>,
    /// Profile JSON, `None` answers 404.
    pub profile: Mutex<Option<Value>>,
    /// When set, refresh calls wait for `release_refresh` before answering.
    /// Callers must observe the call in flight (`refresh_calls`) before releasing.
    hold_refresh: Mutex<bool>,
    gate: Notify,
    /// First attempts to `slow/...` wait here before their token is checked.
    slow_gate: Notify,
    /// Current account password, changed through `auth/change-password/`.
    pub password: Mutex<String>,
    /// `primary_role` sent back with a successful login, when set.
    pub primary_role: Mutex<Option<String>>,
    /// Protected endpoints answer 401 whatever the token.
    pub reject_all: Mutex<bool>,
    issued: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub log: Mutex<Vec<ApiRequest>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            paths: EndpointPaths::default(),
            valid_access: Mutex::new("access-0".into()),
            refresh_mode: Mutex::new(RefreshMode::Grant),
            user: Mutex::new(educator_user(false)),
            profile: Mutex::new(None),
            hold_refresh: Mutex::new(false),
            gate: Notify::new(),
            slow_gate: Notify::new(),
            password: Mutex::new(PASSWORD.into()),
            primary_role: Mutex::new(None),
            reject_all: Mutex::new(false),
            issued: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        })
    }

    /// Invalidate the current access token server-side.
    pub fn expire_access(&self) {
        *self.valid_access.lock() = "expired-elsewhere".into();
    }

    pub fn hold_refresh(&self) { *self.hold_refresh.lock() = true; }

    pub fn release_refresh(&self) {
        *self.hold_refresh.lock() = false;
        self.gate.notify_waiters();
    }

    pub fn release_slow(&self) { self.slow_gate.notify_waiters(); }

    pub fn refresh_calls(&self) -> usize { self.refresh_calls.load(Ordering::SeqCst) }

    /// Requests that reached `path`, in order.
    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        self.log.lock().iter().filter(|r| r.path == path).cloned().collect()
    }

    fn mint_access(&self) -> String {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("access-{}", n);
        *self.valid_access.lock() = token.clone();
        token
    }

    fn authorized(&self, req: &ApiRequest) -> bool {
        req.bearer.as_deref() == Some(self.valid_access.lock().as_str())
    }

    async fn answer(&self, req: ApiRequest) -> Result<ApiResponse, TransportError> {
        self.log.lock().push(req.clone());
        let p = &self.paths;

        if req.path == p.refresh {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            let held = *self.hold_refresh.lock();
            if held {
                self.gate.notified().await;
            }
            let mode = *self.refresh_mode.lock();
            return match mode {
                RefreshMode::Grant => Ok(ok(json!({ "access": self.mint_access() }))),
                RefreshMode::Rotate => {
                    let access = self.mint_access();
                    Ok(ok(json!({ "access": access, "refresh": format!("refresh-{}", access) })))
                }
                RefreshMode::Reject => Ok(ApiResponse::new(401, r#"{"detail": "Token is invalid or expired"}"#)),
                RefreshMode::Offline => Err(TransportError::new("connection refused")),
            };
        }
        if req.path == p.login {
            let body = req.body.clone().unwrap_or(Value::Null);
            if body["password"] != self.password.lock().as_str() {
                return Ok(ApiResponse::new(401, r#"{"error": "Invalid email or password."}"#));
            }
            let access = self.mint_access();
            let user = self.user.lock().clone();
            let mut resp = json!({ "user": user, "tokens": { "access": access, "refresh": "refresh-0" } });
            if let Some(role) = self.primary_role.lock().clone() {
                resp["primary_role"] = json!(role);
            }
            return Ok(ok(resp));
        }
        if req.path == p.logout {
            return Ok(ApiResponse::new(205, ""));
        }
        if req.path.starts_with("slow/") && !req.retried {
            self.slow_gate.notified().await;
        }
        let rejected = *self.reject_all.lock();
        if rejected || !self.authorized(&req) {
            return Ok(ApiResponse::new(401, r#"{"detail": "Given token not valid for any token type"}"#));
        }
        if req.path == p.change_password {
            let body = req.body.clone().unwrap_or(Value::Null);
            let mut password = self.password.lock();
            if body["old_password"] != password.as_str() {
                return Ok(ApiResponse::new(400, r#"{"old_password": ["Old password is incorrect."]}"#));
            }
            *password = body["new_password"].as_str().unwrap_or_default().to_string();
            return Ok(ok(json!({ "message": "Password changed successfully." })));
        }
        if req.path == p.me {
            return Ok(ok(self.user.lock().clone()));
        }
        if req.path == p.teacher_profile || req.path == p.institution_profile {
            return Ok(match self.profile.lock().clone() {
                Some(profile) => ok(profile),
                None => ApiResponse::new(404, r#"{"detail": "Not found."}"#),
            });
        }
        if req.path == "broken/" {
            return Ok(ApiResponse::new(500, r#"{"error": "boom"}"#));
        }
        Ok(ok(json!({ "path": req.path, "token": req.bearer })))
    }
}

impl HttpTransport for FakeApi {
    fn send(&self, req: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, TransportError>> {
        Box::pin(self.answer(req))
    }
}

fn ok(v: Value) -> ApiResponse { ApiResponse::new(200, v.to_string()) }

pub fn educator_user(instructor: bool) -> Value {
    json!({
        "id": "6f1c2a4e-8a7b-4b43-9f7e-0d1b2c3d4e5f",
        "email": "asha@school.edu",
        "username": "asha",
        "user_type": "EDUCATOR",
        "is_verified": true,
        "is_instructor": instructor
    })
}

pub fn institution_user() -> Value {
    json!({
        "id": "0b8a1d5c-2f4e-4c7a-9a11-3e5d7c9b1a2f",
        "email": "office@greenvalley.edu",
        "username": "greenvalley",
        "user_type": "INSTITUTION",
        "is_verified": true
    })
}

/// Client wired to the fake API with an in-memory store.
pub struct Harness {
    pub api: Arc<FakeApi>,
    pub tokens: SharedTokenStore,
    pub coordinator: Arc<RefreshCoordinator>,
    pub client: Arc<AuthenticatedClient>,
}

impl Harness {
    pub fn new() -> Self { Self::with_tokens(None) }

    pub fn with_tokens(pair: Option<TokenPair>) -> Self {
        let api = FakeApi::new();
        let tokens: SharedTokenStore = match pair {
            Some(p) => Arc::new(MemoryTokenStore::with_pair(p)),
            None => Arc::new(MemoryTokenStore::new()),
        };
        let transport: Arc<dyn HttpTransport> = api.clone();
        let backend = Arc::new(HttpRefreshBackend::new(transport.clone(), EndpointPaths::default().refresh));
        let coordinator = Arc::new(RefreshCoordinator::new(tokens.clone(), backend));
        let client = Arc::new(AuthenticatedClient::new(transport, tokens.clone(), coordinator.clone()));
        Self { api, tokens, coordinator, client }
    }

    /// Harness with a live session whose access token the server no longer accepts.
    pub fn expired_session() -> Self {
        let h = Self::with_tokens(Some(TokenPair::new("access-0", "refresh-0")));
        h.api.expire_access();
        h
    }

    pub fn session(&self) -> Arc<SessionContext> {
        Arc::new(SessionContext::new(self.client.clone(), EndpointPaths::default()))
    }
}

/// Yield until `cond` holds. Panics after a bounded number of polls.
pub async fn wait_until<F: Fn() -> bool>(cond: F) {
    for _ in 0..1000 {
        if cond() { return; }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
