//! Account identity, role derivation and the session context exposed to the UI.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod roles;
mod permissions;
mod provider;
mod session;

pub use principal::{EducatorProfile, InstitutionProfile, ProfileRecord, UserRecord, UserType};
pub use roles::{derive_roles, ParseRoleError, Role, RoleSet};
pub use permissions::{permissions_for, resolve_permissions, Permission, PermissionSet};
pub use provider::{AuthApi, AuthOutcome, ChangePasswordRequest, LoginRequest, RegisterRequest};
pub use session::{SessionContext, SessionSnapshot};
