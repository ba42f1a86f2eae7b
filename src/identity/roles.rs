use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::principal::{ProfileRecord, UserRecord, UserType};

/// Coarse authorization category. Closed set; legacy account types are
/// resolved onto these when the user record is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Educator,
    Instructor,
    InstitutionAdmin,
    SuperAdmin,
    /// Every account can consume learning content.
    Learner,
}

impl Role {
    pub const ALL: [Role; 5] = [Role::Educator, Role::Instructor, Role::InstitutionAdmin, Role::SuperAdmin, Role::Learner];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Educator => "EDUCATOR",
            Role::Instructor => "INSTRUCTOR",
            Role::InstitutionAdmin => "INSTITUTION_ADMIN",
            Role::SuperAdmin => "SUPER_ADMIN",
            Role::Learner => "LEARNER",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role '{0}'")]
pub struct ParseRoleError(pub String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let up = s.trim().to_ascii_uppercase();
        Role::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == up)
            .ok_or_else(|| ParseRoleError(s.to_string()))
    }
}

/// Ordered, duplicate-free set of roles. Order is insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSet(Vec<Role>);

impl RoleSet {
    pub fn new() -> Self { Self::default() }

    /// Returns false when the role was already present.
    pub fn insert(&mut self, role: Role) -> bool {
        if self.0.contains(&role) { return false; }
        self.0.push(role);
        true
    }

    pub fn contains(&self, role: Role) -> bool { self.0.contains(&role) }

    pub fn contains_any(&self, roles: &[Role]) -> bool { roles.iter().any(|r| self.contains(*r)) }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ { self.0.iter().copied() }

    pub fn as_slice(&self) -> &[Role] { &self.0 }

    pub fn first(&self) -> Option<Role> { self.0.first().copied() }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        let mut set = RoleSet::new();
        for r in iter { set.insert(r); }
        set
    }
}

/// Derive the role set for an account. The base role comes from the account
/// type; instructor and institution-admin flags add to it; `Learner` is always last.
pub fn derive_roles(user: &UserRecord, profile: Option<&ProfileRecord>) -> RoleSet {
    let mut roles = RoleSet::new();
    let profile_instructor = profile.map(|p| p.is_instructor()).unwrap_or(false);
    let profile_inst_admin = profile.map(|p| p.is_institution_admin()).unwrap_or(false);

    match &user.user_type {
        UserType::Educator => {
            roles.insert(Role::Educator);
            if profile_instructor || user.is_instructor.unwrap_or(false) {
                roles.insert(Role::Instructor);
            }
        }
        UserType::Institution => { roles.insert(Role::InstitutionAdmin); }
        UserType::SuperAdmin => { roles.insert(Role::SuperAdmin); }
        UserType::Other(_) => {}
    }
    if user.is_institution_admin.unwrap_or(false) || profile_inst_admin {
        roles.insert(Role::InstitutionAdmin);
    }
    roles.insert(Role::Learner);

    debug!(target: "auth.session", "roles for user={} type={}: {:?}", user.id, user.user_type.as_str(), roles.as_slice());
    roles
}
