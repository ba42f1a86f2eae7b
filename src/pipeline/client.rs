use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult, RefreshError};
use crate::storage::{open_token_store, SharedTokenStore};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};

use super::coordinator::{HttpRefreshBackend, RefreshCoordinator, SessionEvent};

/// Attaches the current access token to every request and recovers from a
/// 401 by refreshing once and replaying the request once.
pub struct AuthenticatedClient {
    transport: Arc<dyn HttpTransport>,
    tokens: SharedTokenStore,
    coordinator: Arc<RefreshCoordinator>,
}

impl AuthenticatedClient {
    pub fn new(transport: Arc<dyn HttpTransport>, tokens: SharedTokenStore, coordinator: Arc<RefreshCoordinator>) -> Self {
        Self { transport, tokens, coordinator }
    }

    /// Production wiring: reqwest transport, configured token store, HTTP refresh backend.
    pub fn from_config(cfg: &ClientConfig) -> ClientResult<Self> {
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(cfg)?);
        let tokens = open_token_store(cfg.token_file.clone());
        let backend = Arc::new(HttpRefreshBackend::new(transport.clone(), cfg.paths.refresh.clone()));
        let coordinator = Arc::new(RefreshCoordinator::new(tokens.clone(), backend));
        Ok(Self::new(transport, tokens, coordinator))
    }

    pub fn tokens(&self) -> &SharedTokenStore { &self.tokens }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> { &self.coordinator }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> { self.coordinator.subscribe() }

    /// Send a request. Non-401 responses, including error statuses, are returned as-is.
    pub async fn send(&self, req: ApiRequest) -> ClientResult<ApiResponse> {
        let mut req = req;
        let epoch = self.coordinator.epoch();
        req.bearer = self.tokens.access_token();
        let resp = self.transport.send(req.clone()).await?;
        if !resp.is_unauthorized() || req.skip_auth_refresh {
            return Ok(resp);
        }
        if req.retried {
            return Err(ClientError::UnauthorizedOnRetry);
        }
        // Sent under a session that has since been logged out or replaced.
        if self.coordinator.epoch() != epoch {
            debug!(target: "auth.pipeline", "{} {} hit 401 after the session changed; not replaying", req.method, req.path);
            return Err(ClientError::AuthenticationExpired(RefreshError::Cancelled));
        }

        // The token may already have been replaced while this request was in flight.
        let token = match self.tokens.access_token() {
            Some(current) if req.bearer.as_deref() != Some(current.as_str()) => {
                debug!(target: "auth.pipeline", "{} {} hit 401 with a superseded token; replaying", req.method, req.path);
                current
            }
            _ => self.coordinator.refresh().await.map_err(ClientError::AuthenticationExpired)?,
        };
        if self.coordinator.epoch() != epoch {
            return Err(ClientError::AuthenticationExpired(RefreshError::Cancelled));
        }

        req.retried = true;
        req.bearer = Some(token);
        let retry = self.transport.send(req.clone()).await?;
        if retry.is_unauthorized() {
            warn!(target: "auth.pipeline", "{} {} still unauthorized after refresh", req.method, req.path);
            return Err(ClientError::UnauthorizedOnRetry);
        }
        Ok(retry)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.send(ApiRequest::get(path)).await?.into_result()?.json()
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> ClientResult<T> {
        self.send(ApiRequest::post(path).with_json(body)?).await?.into_result()?.json()
    }
}
