use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account type as reported by the backend. Legacy spellings are folded into
/// the current variants when the record is read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UserType {
    Educator,
    Institution,
    SuperAdmin,
    Other(String),
}

impl UserType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "EDUCATOR" | "TEACHER" | "STUDENT" => UserType::Educator,
            "INSTITUTION" => UserType::Institution,
            "ADMIN" | "SUPER_ADMIN" | "SUPERADMIN" => UserType::SuperAdmin,
            _ => UserType::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            UserType::Educator => "EDUCATOR",
            UserType::Institution => "INSTITUTION",
            UserType::SuperAdmin => "SUPER_ADMIN",
            UserType::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for UserType {
    fn from(s: String) -> Self { UserType::parse(&s) }
}

impl From<UserType> for String {
    fn from(t: UserType) -> Self { t.as_str().to_string() }
}

/// Account record returned by `auth/me/`, login and registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    pub user_type: UserType,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_instructor: Option<bool>,
    #[serde(default)]
    pub is_institution_admin: Option<bool>,
    #[serde(default)]
    pub managed_institution_id: Option<Uuid>,
}

impl UserRecord {
    pub fn new(id: Uuid, user_type: UserType) -> Self {
        Self {
            id,
            email: String::new(),
            username: String::new(),
            user_type,
            is_verified: false,
            created_at: None,
            is_instructor: None,
            is_institution_admin: None,
            managed_institution_id: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EducatorProfile {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub current_school: String,
    #[serde(default)]
    pub experience_years: u32,
    #[serde(default)]
    pub is_instructor: bool,
    #[serde(default)]
    pub is_institution_admin: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstitutionProfile {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub institution_name: String,
    #[serde(default)]
    pub institution_type: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub is_institution_admin: bool,
}

/// Role-specific profile extension, fetched after authentication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProfileRecord {
    Educator(EducatorProfile),
    Institution(InstitutionProfile),
}

impl ProfileRecord {
    pub fn is_instructor(&self) -> bool {
        match self {
            ProfileRecord::Educator(p) => p.is_instructor,
            ProfileRecord::Institution(_) => false,
        }
    }

    pub fn is_institution_admin(&self) -> bool {
        match self {
            ProfileRecord::Educator(p) => p.is_institution_admin,
            ProfileRecord::Institution(p) => p.is_institution_admin,
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            ProfileRecord::Educator(p) => format!("{} {}", p.first_name, p.last_name).trim().to_string(),
            ProfileRecord::Institution(p) => p.institution_name.clone(),
        }
    }
}
