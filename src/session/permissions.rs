use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    ReadContent,
    ReactToContent,
    Comment,
    KeepWishlist,
    SubscribeCategories,
    CreateContent,
    ModerateContent,
    ManageCategories,
    ManageUsers,
}

const ADMIN_PERMISSIONS: &[Permission] = &[
    Permission::ReadContent,
    Permission::ReactToContent,
    Permission::Comment,
    Permission::KeepWishlist,
    Permission::SubscribeCategories,
    Permission::CreateContent,
    Permission::ModerateContent,
    Permission::ManageCategories,
    Permission::ManageUsers,
];
const TECH_WRITER_PERMISSIONS: &[Permission] = &[
    Permission::ReadContent,
    Permission::ReactToContent,
    Permission::Comment,
    Permission::KeepWishlist,
    Permission::SubscribeCategories,
    Permission::CreateContent,
    Permission::ModerateContent,
];
const USER_PERMISSIONS: &[Permission] = &[
    Permission::ReadContent,
    Permission::ReactToContent,
    Permission::Comment,
    Permission::KeepWishlist,
    Permission::SubscribeCategories,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    TechWriter,
    User,
}

impl UserRole {
    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            UserRole::Admin => ADMIN_PERMISSIONS,
            UserRole::TechWriter => TECH_WRITER_PERMISSIONS,
            UserRole::User => USER_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::TechWriter => "tech_writer",
            UserRole::User => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for UserRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "tech_writer" => Ok(UserRole::TechWriter),
            "user" => Ok(UserRole::User),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
