//! Session lifecycle integration tests: login, role/permission derivation,
//! mode switching, bootstrap from stored tokens and logout racing a refresh.

mod common;

use serde_json::json;

use acadworld_client::error::{ClientError, RefreshError};
use acadworld_client::identity::{Permission, Role};
use acadworld_client::storage::TokenPair;
use acadworld_client::transport::ApiRequest;

use common::{educator_user, institution_user, wait_until, Harness, RefreshMode, PASSWORD};

#[tokio::test]
async fn educator_login_derives_roles_and_permissions() {
    let h = Harness::new();
    *h.api.user.lock() = educator_user(true);
    let ctx = h.session();

    let snap = ctx.login("asha@school.edu", PASSWORD).await.unwrap();
    assert!(snap.is_authenticated());
    assert_eq!(snap.roles.as_slice(), &[Role::Educator, Role::Instructor, Role::Learner]);
    assert_eq!(snap.active_mode, Some(Role::Educator));
    assert!(ctx.has_permission(Permission::ApplyToJobs));
    assert!(ctx.has_permission(Permission::CreateFdps));
    assert!(!ctx.has_permission(Permission::PostJobs));
    assert_eq!(h.tokens.get(), Some(TokenPair::new("access-1", "refresh-0")));
    // Educator profile endpoint was tried; a 404 does not block the session.
    assert_eq!(h.api.requests_to("profiles/teacher/me/").len(), 1);
    assert!(snap.profile.is_none());
}

#[tokio::test]
async fn bad_credentials_never_trigger_a_refresh() {
    let h = Harness::with_tokens(Some(TokenPair::new("stale", "refresh-0")));
    let ctx = h.session();
    let err = ctx.login("asha@school.edu", "wrong").await.unwrap_err();
    match err {
        ClientError::Http { status, message, .. } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Invalid email or password.");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(h.api.refresh_calls(), 0);
    assert!(!ctx.is_authenticated());
}

#[tokio::test]
async fn institution_profile_flag_and_mode_switching() {
    let h = Harness::new();
    *h.api.user.lock() = institution_user();
    *h.api.profile.lock() = Some(json!({
        "institution_name": "Green Valley School",
        "institution_type": "SCHOOL",
        "is_institution_admin": true
    }));
    let ctx = h.session();
    let snap = ctx.login("office@greenvalley.edu", PASSWORD).await.unwrap();
    assert_eq!(snap.roles.as_slice(), &[Role::InstitutionAdmin, Role::Learner]);
    assert_eq!(snap.profile.as_ref().map(|p| p.display_name()), Some("Green Valley School".to_string()));
    assert!(ctx.has_permission(Permission::IssueCertificates));
    assert!(!ctx.has_permission(Permission::ApplyToJobs));

    assert!(!ctx.switch_mode(Role::Educator));
    assert_eq!(ctx.active_mode(), Some(Role::InstitutionAdmin));
    assert!(ctx.switch_mode(Role::Learner));
    assert_eq!(ctx.active_mode(), Some(Role::Learner));
    assert!(ctx.has_any_role(&[Role::SuperAdmin, Role::Learner]));
    assert!(!ctx.has_role(Role::SuperAdmin));
}

#[tokio::test]
async fn reloading_the_profile_recomputes_roles() {
    let h = Harness::new();
    let ctx = h.session();
    ctx.login("asha@school.edu", PASSWORD).await.unwrap();
    assert!(ctx.switch_mode(Role::Learner));
    assert!(!ctx.has_role(Role::Instructor));

    *h.api.profile.lock() = Some(json!({ "first_name": "Asha", "is_instructor": true }));
    let snap = ctx.reload_profile().await.unwrap();
    assert_eq!(snap.roles.as_slice(), &[Role::Educator, Role::Instructor, Role::Learner]);
    assert!(snap.permissions.contains(Permission::CreateFdps));
    // The chosen mode survives because it is still held.
    assert_eq!(snap.active_mode, Some(Role::Learner));
}

#[tokio::test]
async fn logout_during_refresh_leaves_no_session_behind() {
    let h = Harness::new();
    let ctx = h.session();
    ctx.login("asha@school.edu", PASSWORD).await.unwrap();
    h.api.expire_access();
    h.api.hold_refresh();

    let pending = {
        let ctx = ctx.clone();
        tokio::spawn(async move { ctx.send(ApiRequest::get("jobs/")).await })
    };
    let api = h.api.clone();
    wait_until(move || api.refresh_calls() == 1).await;

    ctx.logout().await;
    h.api.release_refresh();

    let res = pending.await.unwrap();
    assert!(matches!(res, Err(ClientError::AuthenticationExpired(RefreshError::Cancelled))));
    assert!(h.tokens.get().is_none(), "late refresh result must not resurrect tokens");
    assert!(!ctx.is_authenticated());
    assert!(ctx.roles().is_empty());
    assert!(ctx.permissions().is_empty());
    assert_eq!(ctx.active_mode(), None);
    assert_eq!(h.api.requests_to("auth/logout/").len(), 1);
}

#[tokio::test]
async fn bootstrap_restores_a_stored_session() {
    let h = Harness::with_tokens(Some(TokenPair::new("access-0", "refresh-0")));
    let ctx = h.session();
    assert!(ctx.bootstrap().await.unwrap());
    assert_eq!(ctx.current_user().map(|u| u.username), Some("asha".to_string()));
    assert_eq!(ctx.active_mode(), Some(Role::Educator));
}

#[tokio::test]
async fn bootstrap_without_tokens_is_anonymous() {
    let h = Harness::new();
    let ctx = h.session();
    assert!(!ctx.bootstrap().await.unwrap());
    assert!(h.api.log.lock().is_empty());
}

#[tokio::test]
async fn bootstrap_with_dead_refresh_token_clears_everything() {
    let h = Harness::expired_session();
    *h.api.refresh_mode.lock() = RefreshMode::Reject;
    let ctx = h.session();
    assert!(!ctx.bootstrap().await.unwrap());
    assert!(h.tokens.get().is_none());
    assert!(!ctx.is_authenticated());
}

#[tokio::test]
async fn termination_listener_resets_the_context() {
    let h = Harness::new();
    let ctx = h.session();
    ctx.login("asha@school.edu", PASSWORD).await.unwrap();
    let listener = ctx.spawn_termination_listener();

    h.api.expire_access();
    *h.api.refresh_mode.lock() = RefreshMode::Reject;
    // Sent on the raw client, so only the event can tell the context.
    let err = h.client.send(ApiRequest::get("jobs/")).await.unwrap_err();
    assert!(err.is_session_terminal());

    let probe = ctx.clone();
    wait_until(move || !probe.is_authenticated()).await;
    assert!(ctx.roles().is_empty());
    listener.abort();
}

#[tokio::test]
async fn terminal_errors_through_the_context_reset_it() {
    let h = Harness::new();
    let ctx = h.session();
    ctx.login("asha@school.edu", PASSWORD).await.unwrap();
    h.api.expire_access();
    *h.api.refresh_mode.lock() = RefreshMode::Offline;

    let err = ctx.send(ApiRequest::get("jobs/")).await.unwrap_err();
    assert_eq!(err.code_str(), "authentication_expired");
    assert!(!ctx.is_authenticated());
    assert_eq!(ctx.active_mode(), None);
}

#[tokio::test]
async fn new_login_replaces_the_previous_session() {
    let h = Harness::new();
    let ctx = h.session();
    ctx.login("asha@school.edu", PASSWORD).await.unwrap();
    assert!(ctx.has_role(Role::Educator));

    *h.api.user.lock() = institution_user();
    let snap = ctx.login("office@greenvalley.edu", PASSWORD).await.unwrap();
    assert_eq!(snap.active_mode, Some(Role::InstitutionAdmin));
    assert!(!ctx.has_role(Role::Educator));
    assert_eq!(h.tokens.access_token().as_deref(), Some("access-2"));
}

#[tokio::test]
async fn failed_relogin_leaves_no_half_session() {
    let h = Harness::new();
    let ctx = h.session();
    ctx.login("asha@school.edu", PASSWORD).await.unwrap();
    assert!(ctx.has_role(Role::Educator));

    // The second account's profile cannot be loaded even after a refresh.
    *h.api.user.lock() = institution_user();
    *h.api.reject_all.lock() = true;
    let err = ctx.login("office@greenvalley.edu", PASSWORD).await.unwrap_err();
    assert!(matches!(err, ClientError::UnauthorizedOnRetry));

    assert!(!ctx.is_authenticated());
    assert!(ctx.current_user().is_none());
    assert!(ctx.roles().is_empty());
    assert!(ctx.permissions().is_empty());
    assert_eq!(ctx.active_mode(), None);
    assert!(h.tokens.get().is_none());
}

#[tokio::test]
async fn request_from_a_previous_session_is_not_replayed_after_relogin() {
    let h = Harness::new();
    let ctx = h.session();
    ctx.login("asha@school.edu", PASSWORD).await.unwrap();

    let client = h.client.clone();
    let stale = tokio::spawn(async move { client.send(ApiRequest::post("slow/delete-account/")).await });
    let api = h.api.clone();
    wait_until(move || api.requests_to("slow/delete-account/").len() == 1).await;

    ctx.logout().await;
    *h.api.user.lock() = institution_user();
    ctx.login("office@greenvalley.edu", PASSWORD).await.unwrap();
    h.api.release_slow();

    let res = stale.await.unwrap();
    assert!(matches!(res, Err(ClientError::AuthenticationExpired(RefreshError::Cancelled))));
    let sent = h.api.requests_to("slow/delete-account/");
    assert_eq!(sent.len(), 1, "the old session's request must not go out with the new token");
    assert_eq!(sent[0].bearer.as_deref(), Some("access-1"));
    assert_eq!(h.api.refresh_calls(), 0);
    // The new session is untouched.
    assert!(ctx.has_role(Role::InstitutionAdmin));
    assert_eq!(h.tokens.access_token().as_deref(), Some("access-2"));
}

#[tokio::test]
async fn login_primary_role_picks_the_initial_mode() {
    let h = Harness::new();
    let mut user = educator_user(false);
    user["is_institution_admin"] = json!(true);
    *h.api.user.lock() = user;
    *h.api.primary_role.lock() = Some("INSTITUTION_ADMIN".into());
    let ctx = h.session();

    let snap = ctx.login("asha@school.edu", PASSWORD).await.unwrap();
    assert!(snap.roles.contains(Role::Educator));
    assert!(snap.roles.contains(Role::InstitutionAdmin));
    assert_eq!(snap.active_mode, Some(Role::InstitutionAdmin));
}

#[tokio::test]
async fn primary_role_not_held_falls_back_to_the_first_role() {
    let h = Harness::new();
    *h.api.primary_role.lock() = Some("SUPER_ADMIN".into());
    let ctx = h.session();
    let snap = ctx.login("asha@school.edu", PASSWORD).await.unwrap();
    assert!(!snap.roles.contains(Role::SuperAdmin));
    assert_eq!(snap.active_mode, Some(Role::Educator));
}

#[tokio::test]
async fn change_password_then_log_in_with_the_new_one() {
    let h = Harness::new();
    let ctx = h.session();
    ctx.login("asha@school.edu", PASSWORD).await.unwrap();

    let err = ctx.change_password("not-it", "battery-staple").await.unwrap_err();
    assert_eq!(err.http_status(), Some(400));
    assert!(ctx.is_authenticated());

    ctx.change_password(PASSWORD, "battery-staple").await.unwrap();
    let sent = h.api.requests_to("auth/change-password/");
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].method, reqwest::Method::PUT);
    assert_eq!(sent[1].bearer.as_deref(), Some("access-1"));

    ctx.logout().await;
    assert!(ctx.login("asha@school.edu", PASSWORD).await.is_err());
    ctx.login("asha@school.edu", "battery-staple").await.unwrap();
    assert!(ctx.is_authenticated());
}

#[tokio::test]
async fn change_password_requires_a_session() {
    let h = Harness::new();
    let ctx = h.session();
    let err = ctx.change_password(PASSWORD, "battery-staple").await.unwrap_err();
    assert!(matches!(err, ClientError::NotAuthenticated));
    assert!(h.api.log.lock().is_empty());
}
