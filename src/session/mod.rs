//! Authentication session lifecycle.

mod models;
mod permissions;
mod session_store;
pub mod token_claims;
mod token_store;

pub use models::{AuthError, Session, SessionPhase, SessionSnapshot};
pub use permissions::{Permission, UnknownRole, UserRole};
pub use session_store::SessionStore;
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
