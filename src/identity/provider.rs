use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EndpointPaths;
use crate::error::{ClientError, ClientResult};
use crate::pipeline::AuthenticatedClient;
use crate::storage::TokenPair;
use crate::transport::ApiRequest;

use super::principal::{EducatorProfile, InstitutionProfile, ProfileRecord, UserRecord, UserType};
use super::roles::Role;

#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new<E: Into<String>, P: Into<String>>(email: E, password: P) -> Self {
        Self { email: email.into(), password: password.into() }
    }
}

impl Debug for LoginRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest").field("email", &self.email).finish_non_exhaustive()
    }
}

#[derive(Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub user_type: UserType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub profile_data: serde_json::Value,
}

impl Debug for RegisterRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("email", &self.email)
            .field("user_type", &self.user_type)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Serialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

impl Debug for ChangePasswordRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("ChangePasswordRequest { .. }")
    }
}

#[derive(Deserialize)]
struct WireTokens {
    access: String,
    refresh: String,
}

/// Login/registration body. Tokens may sit at the top level or under `tokens`.
#[derive(Deserialize)]
struct AuthEnvelope {
    user: UserRecord,
    #[serde(default)]
    access: Option<String>,
    #[serde(default)]
    refresh: Option<String>,
    #[serde(default)]
    tokens: Option<WireTokens>,
    #[serde(default)]
    primary_role: Option<String>,
}

impl AuthEnvelope {
    fn into_outcome(self) -> ClientResult<AuthOutcome> {
        let tokens = match (self.tokens, self.access, self.refresh) {
            (Some(t), _, _) => TokenPair { access: t.access, refresh: t.refresh },
            (None, Some(access), Some(refresh)) => TokenPair { access, refresh },
            _ => return Err(ClientError::Decode("authentication response carries no token pair".into())),
        };
        let primary_role = self.primary_role.as_deref().and_then(|r| r.parse::<Role>().ok());
        Ok(AuthOutcome { user: self.user, tokens, primary_role })
    }
}

#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub user: UserRecord,
    pub tokens: TokenPair,
    pub primary_role: Option<Role>,
}

/// Typed wrappers over the authentication and profile endpoints.
pub struct AuthApi {
    client: Arc<AuthenticatedClient>,
    paths: EndpointPaths,
}

impl AuthApi {
    pub fn new(client: Arc<AuthenticatedClient>, paths: EndpointPaths) -> Self { Self { client, paths } }

    pub async fn login(&self, req: &LoginRequest) -> ClientResult<AuthOutcome> {
        // A 401 here means bad credentials, not an expired session.
        let http = ApiRequest::post(self.paths.login.clone()).with_json(req)?.without_refresh();
        let resp = self.client.send(http).await?.into_result()?;
        resp.json::<AuthEnvelope>()?.into_outcome()
    }

    pub async fn register(&self, req: &RegisterRequest) -> ClientResult<AuthOutcome> {
        let http = ApiRequest::post(self.paths.register.clone()).with_json(req)?.without_refresh();
        let resp = self.client.send(http).await?.into_result()?;
        resp.json::<AuthEnvelope>()?.into_outcome()
    }

    pub async fn me(&self) -> ClientResult<UserRecord> {
        self.client.get_json(&self.paths.me).await
    }

    /// Fetch the role-specific profile. Accounts without one (admins, or a
    /// profile not created yet) yield `None`.
    pub async fn fetch_profile(&self, user_type: &UserType) -> ClientResult<Option<ProfileRecord>> {
        let path = match user_type {
            UserType::Educator => &self.paths.teacher_profile,
            UserType::Institution => &self.paths.institution_profile,
            _ => return Ok(None),
        };
        let resp = self.client.send(ApiRequest::get(path.clone())).await?;
        if resp.status == 404 {
            debug!(target: "auth.session", "no profile at {}", path);
            return Ok(None);
        }
        let resp = resp.into_result()?;
        let profile = match user_type {
            UserType::Educator => ProfileRecord::Educator(resp.json::<EducatorProfile>()?),
            _ => ProfileRecord::Institution(resp.json::<InstitutionProfile>()?),
        };
        Ok(Some(profile))
    }

    /// Validation failures (wrong old password, weak new one) come back as `Http` 400.
    pub async fn change_password(&self, req: &ChangePasswordRequest) -> ClientResult<()> {
        let http = ApiRequest::put(self.paths.change_password.clone()).with_json(req)?;
        self.client.send(http).await?.into_result()?;
        debug!(target: "auth.session", "password changed");
        Ok(())
    }

    /// Tell the server to revoke the refresh token. Failures are logged and ignored.
    pub async fn logout(&self, refresh_token: &str) {
        let req = ApiRequest::post(self.paths.logout.clone())
            .with_body(serde_json::json!({ "refresh": refresh_token }))
            .without_refresh();
        match self.client.send(req).await.and_then(|r| r.into_result()) {
            Ok(_) => debug!(target: "auth.session", "server logout acknowledged"),
            Err(e) => warn!(target: "auth.session", "server logout failed (ignored): {}", e),
        }
    }
}
