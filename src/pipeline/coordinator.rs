//! Single-flight token refresh.
//!
//! The first caller that needs a new access token becomes the leader: it flips
//! the coordinator from `Idle` to `Refreshing` while holding the state lock and
//! hands the network call to a task the coordinator owns. Every caller, the
//! leader first, is parked on a oneshot channel and released in arrival order
//! with whatever that task produced.
//!
//! | state      | event                         | action                                         | next       |
//! |------------|-------------------------------|------------------------------------------------|------------|
//! | Idle       | refresh requested             | become leader, spawn backend call             | Refreshing |
//! | Refreshing | refresh requested             | enqueue waiter                                 | Refreshing |
//! | Refreshing | backend ok                    | store tokens, release waiters with new access  | Idle       |
//! | Refreshing | backend failed / no token     | clear tokens, reject waiters, emit Terminated  | Idle       |
//! | Refreshing | reset (logout)                | drop waiters, bump epoch, discard late result  | Idle       |

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::error::RefreshError;
use crate::storage::{SharedTokenStore, TokenPair};
use crate::transport::{ApiRequest, HttpTransport};

/// Tokens returned by the refresh endpoint. `refresh` is only present when the
/// server rotates the refresh token.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct RefreshGrant {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

impl std::fmt::Debug for RefreshGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshGrant").field("rotated", &self.refresh.is_some()).finish()
    }
}

/// Performs the actual refresh call.
pub trait RefreshBackend: Send + Sync {
    fn refresh(&self, refresh_token: String) -> BoxFuture<'_, Result<RefreshGrant, RefreshError>>;
}

/// Posts `{"refresh": ..}` to the refresh endpoint over the shared transport.
pub struct HttpRefreshBackend {
    transport: Arc<dyn HttpTransport>,
    path: String,
}

impl HttpRefreshBackend {
    pub fn new<P: Into<String>>(transport: Arc<dyn HttpTransport>, path: P) -> Self {
        Self { transport, path: path.into() }
    }
}

impl RefreshBackend for HttpRefreshBackend {
    fn refresh(&self, refresh_token: String) -> BoxFuture<'_, Result<RefreshGrant, RefreshError>> {
        Box::pin(async move {
            let req = ApiRequest::post(self.path.clone())
                .with_body(serde_json::json!({ "refresh": refresh_token }))
                .without_refresh();
            let resp = self
                .transport
                .send(req)
                .await
                .map_err(|e| RefreshError::TransientNetwork(e.message))?;
            match resp.status {
                401 | 403 => Err(RefreshError::InvalidRefreshToken { status: resp.status }),
                s if !(200..300).contains(&s) => Err(RefreshError::Rejected { status: s }),
                _ => resp.json::<RefreshGrant>().map_err(|e| RefreshError::Decode(e.to_string())),
            }
        })
    }
}

/// Published to session observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Refreshed,
    /// Tokens were cleared; the UI should return to the authentication entry point.
    Terminated { reason: RefreshError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Refreshing,
}

type Waiter = oneshot::Sender<Result<String, RefreshError>>;

enum RefreshState {
    Idle,
    Refreshing { generation: u64, waiters: Vec<Waiter> },
}

struct Inner {
    state: RefreshState,
    generation: u64,
}

enum Ticket {
    Leader { generation: u64, refresh_token: Option<String>, rx: oneshot::Receiver<Result<String, RefreshError>> },
    Follower(oneshot::Receiver<Result<String, RefreshError>>),
}

pub struct RefreshCoordinator {
    inner: Mutex<Inner>,
    tokens: SharedTokenStore,
    backend: Arc<dyn RefreshBackend>,
    events: broadcast::Sender<SessionEvent>,
    refresh_calls: AtomicU64,
    epoch: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(tokens: SharedTokenStore, backend: Arc<dyn RefreshBackend>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            inner: Mutex::new(Inner { state: RefreshState::Idle, generation: 0 }),
            tokens,
            backend,
            events,
            refresh_calls: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> { self.events.subscribe() }

    pub fn phase(&self) -> RefreshPhase {
        match self.inner.lock().state {
            RefreshState::Idle => RefreshPhase::Idle,
            RefreshState::Refreshing { .. } => RefreshPhase::Refreshing,
        }
    }

    /// Callers currently parked on the in-flight refresh, the leader included.
    pub fn queued(&self) -> usize {
        match &self.inner.lock().state {
            RefreshState::Idle => 0,
            RefreshState::Refreshing { waiters, .. } => waiters.len(),
        }
    }

    /// Number of refresh network calls issued so far.
    pub fn refresh_count(&self) -> u64 { self.refresh_calls.load(Ordering::SeqCst) }

    /// Session epoch. Bumped by every `reset`, so a caller can tell whether the
    /// session it started under is still the current one.
    pub fn epoch(&self) -> u64 { self.epoch.load(Ordering::SeqCst) }

    /// Obtain a fresh access token, joining an in-flight refresh if there is one.
    ///
    /// The network call runs on a task owned by the coordinator, so dropping or
    /// aborting any caller (the one that started the refresh included) never
    /// affects the others.
    pub async fn refresh(self: &Arc<Self>) -> Result<String, RefreshError> {
        let rx = match self.enter() {
            Ticket::Follower(rx) => rx,
            Ticket::Leader { generation, refresh_token, rx } => {
                match refresh_token {
                    None => self.finish(generation, Err(RefreshError::MissingRefreshToken)),
                    Some(rt) => {
                        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
                        debug!(target: "auth.refresh", "refresh started generation={}", generation);
                        let this = Arc::clone(self);
                        tokio::spawn(async move {
                            let outcome = this.backend.refresh(rt.clone()).await.map(|grant| (grant, rt));
                            this.finish(generation, outcome);
                        });
                    }
                }
                rx
            }
        };
        rx.await.unwrap_or(Err(RefreshError::Cancelled))
    }

    /// Return to `Idle`, drop every waiter and start a new epoch. A refresh
    /// still in flight will have its result discarded.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let RefreshState::Refreshing { waiters, generation } = std::mem::replace(&mut inner.state, RefreshState::Idle) {
            info!(target: "auth.refresh", "refresh generation={} abandoned by reset, dropping {} waiter(s)", generation, waiters.len());
        }
    }

    // State check and transition happen under one lock acquisition, with no await in between.
    fn enter(&self) -> Ticket {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let (tx, rx) = oneshot::channel();
        if let RefreshState::Refreshing { waiters, generation } = &mut inner.state {
            waiters.push(tx);
            debug!(target: "auth.refresh", "queued behind generation={} (queue={})", generation, waiters.len());
            return Ticket::Follower(rx);
        }
        inner.generation += 1;
        let generation = inner.generation;
        inner.state = RefreshState::Refreshing { generation, waiters: vec![tx] };
        Ticket::Leader { generation, refresh_token: self.tokens.refresh_token(), rx }
    }

    fn finish(&self, generation: u64, outcome: Result<(RefreshGrant, String), RefreshError>) {
        let mut inner = self.inner.lock();
        let waiters = match &mut inner.state {
            RefreshState::Refreshing { generation: current, waiters } if *current == generation => std::mem::take(waiters),
            _ => {
                debug!(target: "auth.refresh", "discarding result of stale refresh generation={}", generation);
                return;
            }
        };
        inner.state = RefreshState::Idle;

        // Token writes happen under the state lock so a concurrent reset() either
        // precedes them (and the result is discarded above) or follows them.
        let result = match outcome {
            Ok((grant, used_refresh)) => {
                let pair = TokenPair { access: grant.access.clone(), refresh: grant.refresh.unwrap_or(used_refresh) };
                self.tokens.set(pair).map(|_| grant.access).map_err(|e| RefreshError::Storage(e.to_string()))
            }
            Err(e) => Err(e),
        };
        if let Err(reason) = &result {
            if let Err(e) = self.tokens.clear() {
                warn!(target: "auth.refresh", "failed to clear tokens after refresh failure: {}", e);
            }
            warn!(target: "auth.refresh", "refresh generation={} failed: {}; session terminated", generation, reason);
        }
        drop(inner);

        let released = waiters.len();
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
        match result {
            Ok(_) => {
                info!(target: "auth.refresh", "refresh generation={} succeeded, released {} waiter(s)", generation, released);
                let _ = self.events.send(SessionEvent::Refreshed);
            }
            Err(reason) => {
                let _ = self.events.send(SessionEvent::Terminated { reason });
            }
        }
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod coordinator_tests;
