//! Moderator and admin tools: the publish queue, flag reports and the user
//! directory.

mod admin_store;
mod moderation_store;

pub use admin_store::AdminStore;
pub use moderation_store::ModerationStore;
