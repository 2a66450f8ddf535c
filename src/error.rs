use thiserror::Error;

use crate::api::ApiError;
use crate::session::Permission;

/// Errors returned by the data stores.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("You need to be logged in to do that")]
    NotAuthenticated,

    /// The session ended or changed while the request was in flight, the
    /// response was dropped.
    #[error("The session changed before the request completed")]
    SessionChanged,

    /// The session's role lacks the permission, no request was sent.
    #[error("Your role does not allow this action ({0:?})")]
    PermissionDenied(Permission),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl StoreError {
    /// True when the server rejected the auth token itself.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, StoreError::Api(err) if err.is_auth_rejection())
    }
}
