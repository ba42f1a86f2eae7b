use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, EndpointPaths};
use crate::error::{ClientError, ClientResult};
use crate::pipeline::{AuthenticatedClient, SessionEvent};
use crate::transport::{ApiRequest, ApiResponse};

use super::permissions::{resolve_permissions, Permission, PermissionSet};
use super::principal::{ProfileRecord, UserRecord};
use super::provider::{AuthApi, AuthOutcome, ChangePasswordRequest, LoginRequest, RegisterRequest};
use super::roles::{derive_roles, Role, RoleSet};

/// Consistent view of the session, cloned out for the UI layer.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub user: Option<UserRecord>,
    pub profile: Option<ProfileRecord>,
    pub roles: RoleSet,
    pub permissions: PermissionSet,
    /// Always a member of `roles`, or `None`.
    pub active_mode: Option<Role>,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool { self.user.is_some() }
}

/// Process-wide session state: the current account, its derived roles and
/// permissions, and the mode the user is acting in.
pub struct SessionContext {
    client: Arc<AuthenticatedClient>,
    api: AuthApi,
    state: RwLock<SessionSnapshot>,
}

impl SessionContext {
    pub fn new(client: Arc<AuthenticatedClient>, paths: EndpointPaths) -> Self {
        let api = AuthApi::new(client.clone(), paths);
        Self { client, api, state: RwLock::new(SessionSnapshot::default()) }
    }

    pub fn from_config(cfg: &ClientConfig) -> ClientResult<Self> {
        let client = Arc::new(AuthenticatedClient::from_config(cfg)?);
        Ok(Self::new(client, cfg.paths.clone()))
    }

    pub fn client(&self) -> &Arc<AuthenticatedClient> { &self.client }

    pub fn api(&self) -> &AuthApi { &self.api }

    pub fn snapshot(&self) -> SessionSnapshot { self.state.read().clone() }

    pub fn is_authenticated(&self) -> bool { self.state.read().is_authenticated() }

    pub fn current_user(&self) -> Option<UserRecord> { self.state.read().user.clone() }

    pub fn roles(&self) -> RoleSet { self.state.read().roles.clone() }

    pub fn permissions(&self) -> PermissionSet { self.state.read().permissions.clone() }

    pub fn active_mode(&self) -> Option<Role> { self.state.read().active_mode }

    pub fn has_role(&self, role: Role) -> bool { self.state.read().roles.contains(role) }

    pub fn has_any_role(&self, roles: &[Role]) -> bool { self.state.read().roles.contains_any(roles) }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.state.read().permissions.contains(permission)
    }

    /// Act as `role`. Ignored (returns false) when the role is not held.
    pub fn switch_mode(&self, role: Role) -> bool {
        let mut state = self.state.write();
        if !state.roles.contains(role) {
            debug!(target: "auth.session", "switch_mode({}) ignored: role not held", role);
            return false;
        }
        state.active_mode = Some(role);
        info!(target: "auth.session", "active mode now {}", role);
        true
    }

    pub async fn login(&self, email: &str, password: &str) -> ClientResult<SessionSnapshot> {
        let outcome = self.api.login(&LoginRequest::new(email, password)).await?;
        self.establish(outcome).await
    }

    pub async fn register(&self, req: &RegisterRequest) -> ClientResult<SessionSnapshot> {
        let outcome = self.api.register(req).await?;
        self.establish(outcome).await
    }

    /// Restore a session from persisted tokens. Returns whether a session is active afterwards.
    pub async fn bootstrap(&self) -> ClientResult<bool> {
        if self.client.tokens().get().is_none() {
            self.clear_local();
            return Ok(false);
        }
        let user = match self.api.me().await {
            Ok(u) => u,
            Err(e) if e.is_session_terminal() || matches!(e, ClientError::UnauthorizedOnRetry) => {
                info!(target: "auth.session", "stored session rejected during bootstrap: {}", e);
                self.clear_local();
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        let profile = self.load_profile(&user).await?;
        self.apply(user, profile, None);
        Ok(true)
    }

    /// Re-read the profile and recompute roles, e.g. after the user edits it.
    pub async fn reload_profile(&self) -> ClientResult<SessionSnapshot> {
        let user = self.current_user().ok_or(ClientError::NotAuthenticated)?;
        let profile = self.load_profile(&user).await?;
        self.apply(user, profile, None);
        Ok(self.snapshot())
    }

    pub async fn change_password(&self, old_password: &str, new_password: &str) -> ClientResult<()> {
        if !self.is_authenticated() {
            return Err(ClientError::NotAuthenticated);
        }
        let req = ChangePasswordRequest { old_password: old_password.to_string(), new_password: new_password.to_string() };
        self.absorb(self.api.change_password(&req).await)
    }

    /// Authenticated call on behalf of the UI. A session-ending failure resets
    /// the context; every other error is returned untouched.
    pub async fn send(&self, req: ApiRequest) -> ClientResult<ApiResponse> {
        self.absorb(self.client.send(req).await)
    }

    /// End the session. The server call is best-effort; local state is always cleared.
    pub async fn logout(&self) {
        if let Some(refresh) = self.client.tokens().refresh_token() {
            self.api.logout(&refresh).await;
        }
        self.clear_local();
        info!(target: "auth.session", "logged out");
    }

    /// React to a coordinator event. `Terminated` resets the context unless a new
    /// session has already been stored since the failure.
    pub fn handle_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Refreshed => debug!(target: "auth.session", "access token refreshed"),
            SessionEvent::Terminated { reason } => {
                if self.client.tokens().get().is_none() {
                    info!(target: "auth.session", "session terminated: {}", reason);
                    self.clear_local();
                }
            }
        }
    }

    /// Background task applying coordinator events. Stops once the context is dropped.
    pub fn spawn_termination_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.client.subscribe();
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(ev) => Some(ev),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(target: "auth.session", "session listener lagged by {} event(s)", skipped);
                        None
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(ctx) = weak.upgrade() else { break };
                match event {
                    Some(ev) => ctx.handle_event(&ev),
                    None => {
                        if ctx.client.tokens().get().is_none() { ctx.clear_local(); }
                    }
                }
            }
        })
    }

    async fn establish(&self, outcome: AuthOutcome) -> ClientResult<SessionSnapshot> {
        let AuthOutcome { user, tokens, primary_role } = outcome;
        // Drop anything left from a previous session before the new pair lands.
        self.clear_local();
        let loaded = match self.client.tokens().set(tokens) {
            Ok(()) => self.load_profile(&user).await,
            Err(e) => Err(e),
        };
        let profile = match loaded {
            Ok(profile) => profile,
            Err(e) => {
                warn!(target: "auth.session", "session setup failed, discarding new tokens: {}", e);
                self.clear_local();
                return Err(e);
            }
        };
        self.apply(user, profile, primary_role);
        let snap = self.snapshot();
        info!(
            target: "auth.session",
            "session established user={} roles={:?} mode={:?}",
            snap.user.as_ref().map(|u| u.id.to_string()).unwrap_or_default(),
            snap.roles.as_slice(),
            snap.active_mode
        );
        Ok(snap)
    }

    // A missing or unreadable profile does not block the session; auth failures do.
    async fn load_profile(&self, user: &UserRecord) -> ClientResult<Option<ProfileRecord>> {
        match self.absorb(self.api.fetch_profile(&user.user_type).await) {
            Ok(p) => Ok(p),
            Err(e) if e.is_session_terminal() || matches!(e, ClientError::UnauthorizedOnRetry) => Err(e),
            Err(e) => {
                warn!(target: "auth.session", "profile fetch failed, continuing without profile: {}", e);
                Ok(None)
            }
        }
    }

    fn apply(&self, user: UserRecord, profile: Option<ProfileRecord>, preferred: Option<Role>) {
        let roles = derive_roles(&user, profile.as_ref());
        let permissions = resolve_permissions(&roles);
        let mut state = self.state.write();
        let active_mode = preferred
            .filter(|r| roles.contains(*r))
            .or_else(|| state.active_mode.filter(|r| roles.contains(*r)))
            .or_else(|| roles.first());
        *state = SessionSnapshot { user: Some(user), profile, roles, permissions, active_mode };
    }

    // Tokens, refresh queue and derived state go together under the state lock,
    // so no reader observes an authenticated user without roles.
    fn clear_local(&self) {
        let mut state = self.state.write();
        self.client.coordinator().reset();
        if let Err(e) = self.client.tokens().clear() {
            warn!(target: "auth.session", "failed to clear token store: {}", e);
        }
        *state = SessionSnapshot::default();
    }

    fn absorb<T>(&self, result: ClientResult<T>) -> ClientResult<T> {
        if let Err(e) = &result {
            if e.is_session_terminal() {
                self.clear_local();
            }
        }
        result
    }
}
