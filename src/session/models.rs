use thiserror::Error;

use super::permissions::{Permission, UserRole};
use crate::api::{ApiError, UserId, UserProfile};
use crate::error::StoreError;

/// An authenticated session. There is at most one per client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: UserProfile,
    pub auth_token: String,
}

impl Session {
    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    pub fn role(&self) -> UserRole {
        self.user.role
    }

    pub fn has_role(&self, role: UserRole) -> bool {
        self.user.role == role
    }

    /// True if the session's role is one of `allowed`.
    pub fn can_access(&self, allowed: &[UserRole]) -> bool {
        allowed.contains(&self.user.role)
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.user.role.has_permission(permission)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Anonymous,
    Authenticating,
    Authenticated,
}

/// Read-only view of the session handed to the other stores.
///
/// `epoch` increases on every login and logout, so a store can tell whether a
/// response belongs to the session that issued the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub epoch: u64,
    pub session: Option<Session>,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.session.as_ref().map(Session::user_id)
    }

    /// Epoch of the current session, provided its role grants `permission`.
    pub fn require(&self, permission: Permission) -> Result<u64, StoreError> {
        match &self.session {
            None => Err(StoreError::NotAuthenticated),
            Some(session) if !session.has_permission(permission) => {
                Err(StoreError::PermissionDenied(permission))
            }
            Some(_) => Ok(self.epoch),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Invalid email or password. Please try again.")]
    InvalidCredentials,

    #[error("{0}")]
    AccountDeactivated(String),

    #[error("Too many login attempts. Please try again later.")]
    RateLimited,

    #[error("Network error: unable to connect to the server ({0})")]
    Network(String),

    #[error("{0}")]
    Rejected(String),

    #[error("An authentication attempt is already in progress")]
    InProgress,

    #[error("Already logged in, log out first")]
    AlreadyAuthenticated,

    #[error("The session ended before authentication completed")]
    Cancelled,
}

impl AuthError {
    /// Map a login failure to the error shown to the user.
    pub fn from_login(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized(_) => AuthError::InvalidCredentials,
            ApiError::Forbidden(detail) if !detail.is_empty() => {
                AuthError::AccountDeactivated(detail)
            }
            ApiError::Forbidden(_) => AuthError::AccountDeactivated(
                "Account deactivated. Please contact administrator.".to_string(),
            ),
            ApiError::RateLimited => AuthError::RateLimited,
            ApiError::Network(msg) => AuthError::Network(msg),
            other => AuthError::Rejected(Self::fallback_message(other, "Login failed")),
        }
    }

    /// Map a registration failure to the error shown to the user.
    pub fn from_register(err: ApiError) -> Self {
        match err {
            ApiError::Conflict(_) => AuthError::Rejected(
                "Email or username already exists. Please use different credentials."
                    .to_string(),
            ),
            ApiError::RateLimited => AuthError::RateLimited,
            ApiError::Network(msg) => AuthError::Network(msg),
            other => AuthError::Rejected(Self::fallback_message(other, "Registration failed")),
        }
    }

    fn fallback_message(err: ApiError, prefix: &str) -> String {
        match err {
            ApiError::Validation(msg) if !msg.is_empty() => msg,
            other => format!("{}: {}", prefix, other),
        }
    }
}
