//! Unified client error model and mapping helpers.
//! `ClientError` is returned by every fallible operation in the crate. Refresh
//! outcomes use the cloneable `RefreshError` so that one failure can be handed
//! to every request that was queued behind the same refresh call.

use thiserror::Error;

/// Why a token refresh cycle ended without a new access token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// The refresh call never reached the server (connect, timeout, TLS).
    #[error("refresh call failed to reach the server: {0}")]
    TransientNetwork(String),
    /// The server rejected the refresh token (401/403).
    #[error("refresh token rejected by server (HTTP {status})")]
    InvalidRefreshToken { status: u16 },
    /// No refresh token was stored when an access-denied response arrived.
    #[error("no refresh token available")]
    MissingRefreshToken,
    /// Any other non-success answer from the refresh endpoint.
    #[error("refresh endpoint answered HTTP {status}")]
    Rejected { status: u16 },
    #[error("refresh response could not be decoded: {0}")]
    Decode(String),
    #[error("refreshed tokens could not be stored: {0}")]
    Storage(String),
    /// The session was logged out while the refresh was in flight.
    #[error("refresh cancelled by logout")]
    Cancelled,
}

/// Failure raised by an `HttpTransport` before any HTTP status was received.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    pub timeout: bool,
}

impl TransportError {
    pub fn new<S: Into<String>>(msg: S) -> Self { Self { message: msg.into(), timeout: false } }
    pub fn timeout<S: Into<String>>(msg: S) -> Self { Self { message: msg.into(), timeout: true } }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self { timeout: err.is_timeout(), message: err.to_string() }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    /// A regular (non-refresh) request failed to reach the server.
    #[error("network error: {0}")]
    Transport(#[from] TransportError),
    /// The token refresh failed; the session has been terminated.
    #[error("authentication expired: {0}")]
    AuthenticationExpired(RefreshError),
    /// The replayed request still came back 401 after a successful refresh.
    #[error("request still unauthorized after token refresh")]
    UnauthorizedOnRetry,
    /// Non-auth HTTP failure passed through to the caller untouched.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, code: String, message: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("token storage error: {0}")]
    Storage(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("not authenticated")]
    NotAuthenticated,
}

impl ClientError {
    pub fn code_str(&self) -> &'static str {
        match self {
            ClientError::Transport(e) if e.timeout => "timeout",
            ClientError::Transport(_) => "network_error",
            ClientError::AuthenticationExpired(RefreshError::MissingRefreshToken) => "missing_refresh_token",
            ClientError::AuthenticationExpired(RefreshError::InvalidRefreshToken { .. }) => "invalid_refresh_token",
            ClientError::AuthenticationExpired(_) => "authentication_expired",
            ClientError::UnauthorizedOnRetry => "unauthorized_on_retry",
            ClientError::Http { .. } => "http_error",
            ClientError::Decode(_) => "decode_error",
            ClientError::Config(_) => "config_error",
            ClientError::Storage(_) => "storage_error",
            ClientError::InvalidRequest(_) => "invalid_request",
            ClientError::NotAuthenticated => "not_authenticated",
        }
    }

    /// Human-readable text for display. For HTTP failures this is the server's own message.
    pub fn message(&self) -> String {
        match self {
            ClientError::Http { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// HTTP status the error corresponds to, when it came from (or stands for) a response.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            ClientError::AuthenticationExpired(_)
            | ClientError::UnauthorizedOnRetry
            | ClientError::NotAuthenticated => Some(401),
            _ => None,
        }
    }

    /// True when the error ends the session: tokens are gone and the UI should
    /// return to the authentication entry point. A refresh cancelled by logout
    /// or a new login is not terminal; whoever reset the session owns its state.
    pub fn is_session_terminal(&self) -> bool {
        matches!(self, ClientError::AuthenticationExpired(r) if *r != RefreshError::Cancelled)
    }

    pub fn http<S: Into<String>>(status: u16, code: S, msg: S) -> Self {
        ClientError::Http { status, code: code.into(), message: msg.into() }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self { ClientError::Decode(err.to_string()) }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self { ClientError::Storage(err.to_string()) }
}

pub type ClientResult<T> = Result<T, ClientError>;
