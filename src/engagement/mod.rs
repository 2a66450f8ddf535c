//! Likes and dislikes on content items.

mod engagement_store;
mod reaction;

pub use engagement_store::EngagementStore;
pub use reaction::{next_reaction, Reaction, ReactionState};
