use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::reaction::{next_reaction, Reaction, ReactionState};
use crate::api::{ContentApi, ContentId, ContentItem, ContentPage, ContentQuery, Pagination};
use crate::error::StoreError;
use crate::reconcile::{Completion, MutationPhase, Tracked};
use crate::session::SessionSnapshot;

#[derive(Default)]
struct EngagementState {
    items: HashMap<ContentId, ContentItem>,
    reactions: HashMap<ContentId, Tracked<ReactionState>>,
    feed: Vec<ContentId>,
    pagination: Pagination,
}

impl EngagementState {
    /// Takes a freshly fetched item into the cache.
    fn absorb(&mut self, item: ContentItem) {
        let fetched = ReactionState::from_item(&item);
        match self.reactions.get_mut(&item.id) {
            Some(tracked) => {
                if !tracked.refresh(fetched) {
                    debug!("Content {} has a reaction in flight, keeping local state", item.id);
                }
            }
            None => {
                self.reactions.insert(item.id, Tracked::new(fetched));
            }
        }
        self.items.insert(item.id, item);
    }

    /// Cached item with the displayed reaction laid over it.
    fn view(&self, content_id: ContentId) -> Option<ContentItem> {
        let mut item = self.items.get(&content_id)?.clone();
        if let Some(tracked) = self.reactions.get(&content_id) {
            tracked.displayed().apply_to(&mut item);
        }
        Some(item)
    }
}

/// Content cache plus the caller's like/dislike state per content item.
pub struct EngagementStore {
    api: Arc<dyn ContentApi>,
    session: watch::Receiver<SessionSnapshot>,
    state: Mutex<EngagementState>,
}

impl EngagementStore {
    pub fn new(api: Arc<dyn ContentApi>, session: watch::Receiver<SessionSnapshot>) -> Self {
        Self {
            api,
            session,
            state: Mutex::new(EngagementState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, EngagementState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn session_epoch(&self) -> u64 {
        self.session.borrow().epoch
    }

    fn authenticated_epoch(&self) -> Result<u64, StoreError> {
        let snapshot = self.session.borrow();
        if !snapshot.is_authenticated() {
            return Err(StoreError::NotAuthenticated);
        }
        Ok(snapshot.epoch)
    }

    /// Presses the like or dislike button on a content item.
    ///
    /// The display changes at once. The request carries the absolute reaction
    /// the user ends up with, and its response replaces the local counts. On
    /// failure the display returns to the last state the server confirmed.
    pub async fn toggle_reaction(
        &self,
        content_id: ContentId,
        desired: Reaction,
    ) -> Result<ReactionState, StoreError> {
        let epoch = self.authenticated_epoch()?;

        let (seq, target) = {
            let mut state = self.state();
            let tracked = state
                .reactions
                .entry(content_id)
                .or_insert_with(|| Tracked::new(ReactionState::default()));
            let current = *tracked.displayed();
            let target = next_reaction(current.reaction, desired);
            let seq = tracked.begin(current.predict(target));
            (seq, target)
        };
        debug!(
            "Reaction on content {} set to {:?} (seq {})",
            content_id, target, seq
        );

        let result = self
            .api
            .set_reaction(content_id, target.map(Reaction::is_like))
            .await;

        if self.session_epoch() != epoch {
            debug!(
                "Dropping reaction response for content {}, session changed",
                content_id
            );
            return Err(StoreError::SessionChanged);
        }

        let mut state = self.state();
        let Some(tracked) = state.reactions.get_mut(&content_id) else {
            return Err(StoreError::SessionChanged);
        };

        match result {
            Ok(response) => {
                if tracked.confirm(seq, ReactionState::from(response)) == Completion::Superseded {
                    debug!(
                        "Reaction response for content {} (seq {}) superseded by a newer toggle",
                        content_id, seq
                    );
                }
                Ok(*tracked.displayed())
            }
            Err(err) => {
                if tracked.fail(seq) == Completion::Applied {
                    warn!(
                        "Reaction on content {} failed, rolled back: {}",
                        content_id, err
                    );
                } else {
                    debug!(
                        "Reaction on content {} (seq {}) failed after a newer toggle: {}",
                        content_id, seq, err
                    );
                }
                Err(err.into())
            }
        }
    }

    /// Loads one page of the content feed.
    pub async fn fetch_feed(&self, query: &ContentQuery) -> Result<ContentPage, StoreError> {
        let epoch = self.session_epoch();
        let page = self.api.list_content(query).await?;
        if self.session_epoch() != epoch {
            return Err(StoreError::SessionChanged);
        }

        let mut state = self.state();
        state.feed = page.items.iter().map(|item| item.id).collect();
        state.pagination = page.pagination;
        for item in page.items {
            state.absorb(item);
        }
        let items = state
            .feed
            .iter()
            .filter_map(|id| state.view(*id))
            .collect();
        Ok(ContentPage {
            items,
            pagination: state.pagination,
        })
    }

    /// Loads a single content item, e.g. for a detail view.
    pub async fn fetch_content(&self, content_id: ContentId) -> Result<ContentItem, StoreError> {
        let epoch = self.session_epoch();
        let item = self.api.get_content(content_id).await?;
        if self.session_epoch() != epoch {
            return Err(StoreError::SessionChanged);
        }

        let mut state = self.state();
        state.absorb(item);
        state.view(content_id).ok_or(StoreError::SessionChanged)
    }

    pub fn reaction(&self, content_id: ContentId) -> Option<ReactionState> {
        self.state()
            .reactions
            .get(&content_id)
            .map(|tracked| *tracked.displayed())
    }

    pub fn phase(&self, content_id: ContentId) -> Option<MutationPhase> {
        self.state()
            .reactions
            .get(&content_id)
            .map(Tracked::phase)
    }

    pub fn item(&self, content_id: ContentId) -> Option<ContentItem> {
        self.state().view(content_id)
    }

    /// Items of the last fetched feed page, in feed order.
    pub fn items(&self) -> Vec<ContentItem> {
        let state = self.state();
        state.feed.iter().filter_map(|id| state.view(*id)).collect()
    }

    pub fn pagination(&self) -> Pagination {
        self.state().pagination
    }

    pub fn is_empty(&self) -> bool {
        let state = self.state();
        state.items.is_empty() && state.reactions.is_empty()
    }

    pub fn clear(&self) {
        *self.state() = EngagementState::default();
    }

    /// Takes an item returned by a write endpoint into the cache.
    pub(crate) fn upsert(&self, item: ContentItem) {
        self.state().absorb(item);
    }

    /// Edits a cached item in place. Returns false when it is not cached.
    pub(crate) fn patch_item(
        &self,
        content_id: ContentId,
        edit: impl FnOnce(&mut ContentItem),
    ) -> bool {
        match self.state().items.get_mut(&content_id) {
            Some(item) => {
                edit(item);
                true
            }
            None => false,
        }
    }

    /// Drops a deleted item from the cache and the current feed page.
    pub(crate) fn forget(&self, content_id: ContentId) {
        let mut state = self.state();
        state.items.remove(&content_id);
        state.feed.retain(|id| *id != content_id);
        if state
            .reactions
            .get(&content_id)
            .is_some_and(|tracked| !tracked.is_pending())
        {
            state.reactions.remove(&content_id);
        }
    }
}
