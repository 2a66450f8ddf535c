use serde::{Deserialize, Serialize};

use crate::api::{ContentItem, ReactionResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reaction {
    Like,
    Dislike,
}

impl Reaction {
    /// Wire form: `true` like, `false` dislike.
    pub fn is_like(self) -> bool {
        matches!(self, Reaction::Like)
    }

    pub fn from_is_like(is_like: Option<bool>) -> Option<Self> {
        is_like.map(|like| if like { Reaction::Like } else { Reaction::Dislike })
    }
}

/// Reaction the user ends up with after pressing `desired` while holding `current`.
///
/// Pressing the active reaction again clears it, anything else switches to `desired`.
pub fn next_reaction(current: Option<Reaction>, desired: Reaction) -> Option<Reaction> {
    if current == Some(desired) {
        None
    } else {
        Some(desired)
    }
}

/// The caller's reaction to one content item together with its public counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReactionState {
    pub reaction: Option<Reaction>,
    pub likes_count: u64,
    pub dislikes_count: u64,
}

impl ReactionState {
    pub fn from_item(item: &ContentItem) -> Self {
        Self {
            reaction: Reaction::from_is_like(item.user_reaction),
            likes_count: item.likes_count,
            dislikes_count: item.dislikes_count,
        }
    }

    /// Local prediction of the state after switching to `target`.
    pub fn predict(&self, target: Option<Reaction>) -> Self {
        let mut next = *self;
        match self.reaction {
            Some(Reaction::Like) => next.likes_count = next.likes_count.saturating_sub(1),
            Some(Reaction::Dislike) => {
                next.dislikes_count = next.dislikes_count.saturating_sub(1)
            }
            None => {}
        }
        match target {
            Some(Reaction::Like) => next.likes_count += 1,
            Some(Reaction::Dislike) => next.dislikes_count += 1,
            None => {}
        }
        next.reaction = target;
        next
    }

    /// Copies the state onto a cached content item.
    pub fn apply_to(&self, item: &mut ContentItem) {
        item.likes_count = self.likes_count;
        item.dislikes_count = self.dislikes_count;
        item.user_reaction = self.reaction.map(Reaction::is_like);
    }
}

impl From<ReactionResponse> for ReactionState {
    fn from(response: ReactionResponse) -> Self {
        Self {
            reaction: Reaction::from_is_like(response.is_like),
            likes_count: response.likes_count,
            dislikes_count: response.dislikes_count,
        }
    }
}
