//! Static role → permission table.
//!
//! Rows mirror the backend's permission classes: educators apply to jobs and
//! buy training programs, institutions post jobs, sell programs and issue
//! certificates, super admins hold every permission.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use super::roles::{Role, RoleSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewJobs,
    ApplyToJobs,
    PostJobs,
    ViewApplicants,
    ViewCourses,
    EnrollInCourses,
    PurchaseFdps,
    CreateFdps,
    SellFdps,
    IssueCertificates,
    EditOwnProfile,
    ManageInstitutionPage,
    ManageInstitutionAdmins,
    ViewFeed,
    CreatePosts,
    ConnectWithPeers,
    RegisterForEvents,
    CreateEvents,
    ViewAnalytics,
    ModerateContent,
    ManageUsers,
    VerifyInstitutions,
    AccessAdminPanel,
}

impl Permission {
    pub const ALL: [Permission; 23] = [
        Permission::ViewJobs,
        Permission::ApplyToJobs,
        Permission::PostJobs,
        Permission::ViewApplicants,
        Permission::ViewCourses,
        Permission::EnrollInCourses,
        Permission::PurchaseFdps,
        Permission::CreateFdps,
        Permission::SellFdps,
        Permission::IssueCertificates,
        Permission::EditOwnProfile,
        Permission::ManageInstitutionPage,
        Permission::ManageInstitutionAdmins,
        Permission::ViewFeed,
        Permission::CreatePosts,
        Permission::ConnectWithPeers,
        Permission::RegisterForEvents,
        Permission::CreateEvents,
        Permission::ViewAnalytics,
        Permission::ModerateContent,
        Permission::ManageUsers,
        Permission::VerifyInstitutions,
        Permission::AccessAdminPanel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ViewJobs => "view_jobs",
            Permission::ApplyToJobs => "apply_to_jobs",
            Permission::PostJobs => "post_jobs",
            Permission::ViewApplicants => "view_applicants",
            Permission::ViewCourses => "view_courses",
            Permission::EnrollInCourses => "enroll_in_courses",
            Permission::PurchaseFdps => "purchase_fdps",
            Permission::CreateFdps => "create_fdps",
            Permission::SellFdps => "sell_fdps",
            Permission::IssueCertificates => "issue_certificates",
            Permission::EditOwnProfile => "edit_own_profile",
            Permission::ManageInstitutionPage => "manage_institution_page",
            Permission::ManageInstitutionAdmins => "manage_institution_admins",
            Permission::ViewFeed => "view_feed",
            Permission::CreatePosts => "create_posts",
            Permission::ConnectWithPeers => "connect_with_peers",
            Permission::RegisterForEvents => "register_for_events",
            Permission::CreateEvents => "create_events",
            Permission::ViewAnalytics => "view_analytics",
            Permission::ModerateContent => "moderate_content",
            Permission::ManageUsers => "manage_users",
            Permission::VerifyInstitutions => "verify_institutions",
            Permission::AccessAdminPanel => "access_admin_panel",
        }
    }
}

impl Display for Permission {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

const EDUCATOR: &[Permission] = &[
    Permission::ViewJobs,
    Permission::ApplyToJobs,
    Permission::PurchaseFdps,
    Permission::EditOwnProfile,
    Permission::ViewFeed,
    Permission::CreatePosts,
    Permission::ConnectWithPeers,
    Permission::RegisterForEvents,
];

// Qualified educators may run their own training programs.
const INSTRUCTOR: &[Permission] = &[Permission::CreateFdps, Permission::CreateEvents];

// Institutions can never apply to jobs.
const INSTITUTION_ADMIN: &[Permission] = &[
    Permission::ViewJobs,
    Permission::PostJobs,
    Permission::ViewApplicants,
    Permission::CreateFdps,
    Permission::SellFdps,
    Permission::IssueCertificates,
    Permission::EditOwnProfile,
    Permission::ManageInstitutionPage,
    Permission::ManageInstitutionAdmins,
    Permission::ViewFeed,
    Permission::CreatePosts,
    Permission::CreateEvents,
    Permission::ViewAnalytics,
];

const LEARNER: &[Permission] = &[Permission::ViewCourses, Permission::EnrollInCourses, Permission::ViewFeed];

pub fn permissions_for(role: Role) -> &'static [Permission] {
    match role {
        Role::Educator => EDUCATOR,
        Role::Instructor => INSTRUCTOR,
        Role::InstitutionAdmin => INSTITUTION_ADMIN,
        Role::SuperAdmin => &Permission::ALL,
        Role::Learner => LEARNER,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn contains(&self, p: Permission) -> bool { self.0.contains(&p) }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ { self.0.iter().copied() }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Presence flag for every known permission, keyed by token.
    pub fn to_flags(&self) -> BTreeMap<&'static str, bool> {
        Permission::ALL.iter().map(|p| (p.as_str(), self.contains(*p))).collect()
    }
}

/// Union of the table rows for every role. Always computed from scratch.
pub fn resolve_permissions(roles: &RoleSet) -> PermissionSet {
    let mut out = BTreeSet::new();
    for role in roles.iter() {
        out.extend(permissions_for(role).iter().copied());
    }
    PermissionSet(out)
}
