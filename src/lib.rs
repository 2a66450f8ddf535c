//! TechHub client library
//!
//! Client-side data stores for the TechHub content platform, kept in sync with
//! the REST API through optimistic updates. Readers get likes, the wishlist,
//! category subscriptions, notifications and comments. Writers and admins also
//! get authoring, the moderation queue and the user directory.

pub mod api;
pub mod authoring;
pub mod client;
pub mod comments;
pub mod config;
pub mod engagement;
pub mod error;
pub mod membership;
pub mod moderation;
pub mod notices;
pub mod notifications;
pub mod reconcile;
pub mod session;


// Re-export commonly used types for convenience
pub use api::{ApiError, HttpApiClient, TechHubApi};
pub use client::TechHubClient;
pub use config::{CliConfig, ClientConfig, FileConfig};
pub use engagement::{Reaction, ReactionState};
pub use error::StoreError;
pub use session::{AuthError, Session, SessionSnapshot, UserRole};
