//! HTTP transport seam.
//!
//! The request pipeline talks to the network only through `HttpTransport`, so
//! the refresh/replay logic can be driven by scripted transports in tests.
//! `ReqwestTransport` is the production implementation.

use std::fmt::{Debug, Formatter};

use futures_util::future::BoxFuture;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult, TransportError};

/// An outbound call, replayable by value.
#[derive(Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base, e.g. `auth/me/`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Access token captured at send time. Set by the pipeline, not by callers.
    pub bearer: Option<String>,
    /// Set on the single replay after a refresh.
    pub retried: bool,
    /// A 401 on this request must never start a refresh (the refresh call itself).
    pub skip_auth_refresh: bool,
}

impl ApiRequest {
    pub fn new<P: Into<String>>(method: Method, path: P) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            bearer: None,
            retried: false,
            skip_auth_refresh: false,
        }
    }

    pub fn get<P: Into<String>>(path: P) -> Self { Self::new(Method::GET, path) }
    pub fn post<P: Into<String>>(path: P) -> Self { Self::new(Method::POST, path) }
    pub fn put<P: Into<String>>(path: P) -> Self { Self::new(Method::PUT, path) }
    pub fn patch<P: Into<String>>(path: P) -> Self { Self::new(Method::PATCH, path) }
    pub fn delete<P: Into<String>>(path: P) -> Self { Self::new(Method::DELETE, path) }

    pub fn with_json<T: Serialize>(mut self, body: &T) -> ClientResult<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn without_refresh(mut self) -> Self {
        self.skip_auth_refresh = true;
        self
    }
}

impl Debug for ApiRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("has_body", &self.body.is_some())
            .field("has_bearer", &self.bearer.is_some())
            .field("retried", &self.retried)
            .field("skip_auth_refresh", &self.skip_auth_refresh)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new<B: Into<String>>(status: u16, body: B) -> Self { Self { status, body: body.into() } }

    pub fn is_success(&self) -> bool { (200..300).contains(&self.status) }

    pub fn is_unauthorized(&self) -> bool { self.status == 401 }

    /// Decode the body. An empty body decodes as JSON `null`.
    pub fn json<T: DeserializeOwned>(&self) -> ClientResult<T> {
        let text = if self.body.trim().is_empty() { "null" } else { self.body.as_str() };
        serde_json::from_str(text).map_err(|e| ClientError::Decode(format!("HTTP {} body: {}", self.status, e)))
    }

    /// Keep 2xx responses, turn anything else into `ClientError::Http`.
    pub fn into_result(self) -> ClientResult<Self> {
        if self.is_success() {
            return Ok(self);
        }
        let message = error_message_from_body(&self.body).unwrap_or_else(|| {
            let trimmed = self.body.trim();
            if trimmed.is_empty() { format!("request failed with HTTP {}", self.status) } else { truncate(trimmed, 200) }
        });
        Err(ClientError::Http { status: self.status, code: format!("http_{}", self.status), message })
    }
}

/// Backend errors arrive as `{"error": ".."}`, `{"detail": ".."}` or `{"message": ".."}`.
fn error_message_from_body(body: &str) -> Option<String> {
    let v: Value = serde_json::from_str(body).ok()?;
    ["error", "detail", "message"]
        .iter()
        .find_map(|k| v.get(*k).and_then(|m| m.as_str()).map(|s| s.to_string()))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max { return s.to_string(); }
    s.chars().take(max).collect::<String>() + "…"
}

/// Sends one request and reports the raw status and body.
pub trait HttpTransport: Send + Sync {
    fn send(&self, req: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, TransportError>>;
}

pub struct ReqwestTransport {
    base: Url,
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(cfg: &ClientConfig) -> ClientResult<Self> {
        let base = cfg.base_url()?;
        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .user_agent(cfg.user_agent.clone())
            .build()
            .map_err(|e| ClientError::Config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { base, client })
    }

    pub fn base(&self) -> &Url { &self.base }

    fn url_for(&self, path: &str) -> Result<Url, TransportError> {
        // A leading slash would make `join` drop the base path.
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| TransportError::new(format!("invalid path '{}': {}", path, e)))
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, req: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, TransportError>> {
        Box::pin(async move {
            let url = self.url_for(&req.path)?;
            let mut builder = self.client.request(req.method.clone(), url);
            if !req.query.is_empty() {
                builder = builder.query(&req.query);
            }
            if let Some(token) = &req.bearer {
                builder = builder.bearer_auth(token);
            }
            if let Some(body) = &req.body {
                builder = builder.json(body);
            }
            let resp = builder.send().await?;
            let status = resp.status().as_u16();
            let body = resp.text().await?;
            Ok(ApiResponse { status, body })
        })
    }
}
