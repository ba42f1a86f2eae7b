//! Client configuration.
//!
//! Values come from built-in defaults, then an optional JSON file, then the
//! `ACADWORLD_*` environment variables. Every field in the file is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

pub const ENV_API_BASE: &str = "ACADWORLD_API_BASE";
pub const ENV_TOKEN_FILE: &str = "ACADWORLD_TOKEN_FILE";
pub const ENV_HTTP_TIMEOUT_MS: &str = "ACADWORLD_HTTP_TIMEOUT_MS";

/// Relative endpoint paths, joined onto `api_base`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct EndpointPaths {
    #[serde(default = "EndpointPaths::default_login")]
    pub login: String,
    #[serde(default = "EndpointPaths::default_register")]
    pub register: String,
    #[serde(default = "EndpointPaths::default_refresh")]
    pub refresh: String,
    #[serde(default = "EndpointPaths::default_me")]
    pub me: String,
    #[serde(default = "EndpointPaths::default_logout")]
    pub logout: String,
    #[serde(default = "EndpointPaths::default_change_password")]
    pub change_password: String,
    #[serde(default = "EndpointPaths::default_teacher_profile")]
    pub teacher_profile: String,
    #[serde(default = "EndpointPaths::default_institution_profile")]
    pub institution_profile: String,
}

impl EndpointPaths {
    fn default_login() -> String { "auth/login/".to_string() }
    fn default_register() -> String { "auth/register/".to_string() }
    fn default_refresh() -> String { "auth/refresh/".to_string() }
    fn default_me() -> String { "auth/me/".to_string() }
    fn default_logout() -> String { "auth/logout/".to_string() }
    fn default_change_password() -> String { "auth/change-password/".to_string() }
    fn default_teacher_profile() -> String { "profiles/teacher/me/".to_string() }
    fn default_institution_profile() -> String { "profiles/institution/me/".to_string() }
}

impl Default for EndpointPaths {
    fn default() -> Self {
        Self {
            login: Self::default_login(),
            register: Self::default_register(),
            refresh: Self::default_refresh(),
            me: Self::default_me(),
            logout: Self::default_logout(),
            change_password: Self::default_change_password(),
            teacher_profile: Self::default_teacher_profile(),
            institution_profile: Self::default_institution_profile(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct ClientConfig {
    /// Base URL every endpoint path is joined onto. Always ends with `/`.
    #[serde(default = "ClientConfig::default_api_base")]
    pub api_base: String,
    /// Where persisted tokens live. `None` keeps tokens in memory only.
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    #[serde(default = "ClientConfig::default_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "ClientConfig::default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub paths: EndpointPaths,
}

impl ClientConfig {
    fn default_api_base() -> String { "http://127.0.0.1:8000/api/".to_string() }
    fn default_timeout_ms() -> u64 { 30_000 }
    fn default_user_agent() -> String { format!("acadworld-client/{}", env!("CARGO_PKG_VERSION")) }

    /// Defaults overlaid with environment variables.
    pub fn from_env() -> ClientResult<Self> {
        Self::default().with_env_overrides()
    }

    /// Load a JSON config file, then apply environment overrides on top.
    pub fn from_file(path: &Path) -> ClientResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let cfg: ClientConfig = serde_json::from_str(&text)
            .map_err(|e| ClientError::Config(format!("invalid config {}: {}", path.display(), e)))?;
        cfg.with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> ClientResult<Self> {
        if let Ok(base) = std::env::var(ENV_API_BASE) {
            if !base.trim().is_empty() { self.api_base = base.trim().to_string(); }
        }
        if let Ok(file) = std::env::var(ENV_TOKEN_FILE) {
            if !file.trim().is_empty() { self.token_file = Some(PathBuf::from(file.trim())); }
        }
        if let Ok(ms) = std::env::var(ENV_HTTP_TIMEOUT_MS) {
            self.request_timeout_ms = ms
                .trim()
                .parse()
                .map_err(|_| ClientError::Config(format!("{} must be an integer, got '{}'", ENV_HTTP_TIMEOUT_MS, ms)))?;
        }
        self.validate()
    }

    /// Check the base URL and normalize it to end with `/` so relative joins keep its path.
    pub fn validate(mut self) -> ClientResult<Self> {
        if !self.api_base.ends_with('/') { self.api_base.push('/'); }
        let url = Url::parse(&self.api_base)
            .map_err(|e| ClientError::Config(format!("invalid api_base '{}': {}", self.api_base, e)))?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(ClientError::Config(format!("unsupported api_base scheme '{}'", other))),
        }
        if self.request_timeout_ms == 0 {
            return Err(ClientError::Config("request timeout must be greater than zero".into()));
        }
        Ok(self)
    }

    pub fn base_url(&self) -> ClientResult<Url> {
        Url::parse(&self.api_base).map_err(|e| ClientError::Config(e.to_string()))
    }

    pub fn request_timeout(&self) -> Duration { Duration::from_millis(self.request_timeout_ms) }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: Self::default_api_base(),
            token_file: None,
            request_timeout_ms: Self::default_timeout_ms(),
            user_agent: Self::default_user_agent(),
            paths: EndpointPaths::default(),
        }
    }
}
