use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{
    ApiError, ApiResult, ContentFlag, ContentId, ContentItem, ContentStatus, FlagId, ModerationApi,
};
use crate::engagement::EngagementStore;
use crate::error::StoreError;
use crate::reconcile::{Completion, MutationPhase, Tracked};
use crate::session::{Permission, SessionSnapshot};

#[derive(Default)]
struct ModerationState {
    queue: Vec<ContentId>,
    items: HashMap<ContentId, ContentItem>,
    /// `None` until a moderator decides.
    decisions: HashMap<ContentId, Tracked<Option<ContentStatus>>>,
    flag_order: Vec<FlagId>,
    flags: HashMap<FlagId, ContentFlag>,
    resolutions: HashMap<FlagId, Tracked<bool>>,
}

impl ModerationState {
    fn item_view(&self, content_id: ContentId) -> Option<ContentItem> {
        let mut item = self.items.get(&content_id)?.clone();
        if let Some(status) = self.decisions.get(&content_id).and_then(|d| *d.displayed()) {
            item.status = status;
        }
        Some(item)
    }

    fn flag_view(&self, flag_id: FlagId) -> Option<ContentFlag> {
        let mut flag = self.flags.get(&flag_id)?.clone();
        if let Some(resolution) = self.resolutions.get(&flag_id) {
            flag.is_resolved = *resolution.displayed();
        }
        Some(flag)
    }

    fn has_open_flags(&self, content_id: ContentId) -> bool {
        self.flag_order
            .iter()
            .filter_map(|id| self.flag_view(*id))
            .any(|flag| flag.content_id == content_id && !flag.is_resolved)
    }
}

/// Publish queue and flag reports for moderators.
///
/// Decisions show up at once and roll back on failure. Status changes and
/// cleared flags are written through to the shared content cache.
pub struct ModerationStore {
    api: Arc<dyn ModerationApi>,
    engagement: Arc<EngagementStore>,
    session: watch::Receiver<SessionSnapshot>,
    state: Mutex<ModerationState>,
}

impl ModerationStore {
    pub fn new(
        api: Arc<dyn ModerationApi>,
        engagement: Arc<EngagementStore>,
        session: watch::Receiver<SessionSnapshot>,
    ) -> Self {
        Self {
            api,
            engagement,
            session,
            state: Mutex::new(ModerationState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ModerationState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn permitted_epoch(&self) -> Result<u64, StoreError> {
        self.session.borrow().require(Permission::ModerateContent)
    }

    fn ensure_epoch(&self, epoch: u64) -> Result<(), StoreError> {
        if self.session.borrow().epoch != epoch {
            return Err(StoreError::SessionChanged);
        }
        Ok(())
    }

    /// Loads the publish queue. Items with a decision in flight keep their
    /// displayed status.
    pub async fn fetch_pending(&self) -> Result<Vec<ContentItem>, StoreError> {
        let epoch = self.permitted_epoch()?;
        let items = self.api.list_pending_content().await?;
        self.ensure_epoch(epoch)?;

        let mut guard = self.state();
        let state = &mut *guard;
        let fetched: Vec<ContentId> = items.iter().map(|item| item.id).collect();
        state
            .decisions
            .retain(|id, tracked| tracked.is_pending() || fetched.contains(id));
        let decisions = &state.decisions;
        state.items.retain(|id, _| decisions.contains_key(id));
        for item in items {
            state
                .decisions
                .entry(item.id)
                .and_modify(|tracked| {
                    tracked.refresh(None);
                })
                .or_insert_with(|| Tracked::new(None));
            state.items.insert(item.id, item);
        }
        state.queue = fetched;
        debug!("Moderation queue holds {} items", state.queue.len());
        Ok(state.queue.iter().filter_map(|id| state.item_view(*id)).collect())
    }

    /// Queue items still waiting for a decision.
    pub fn pending(&self) -> Vec<ContentItem> {
        let state = self.state();
        state
            .queue
            .iter()
            .filter(|id| {
                state
                    .decisions
                    .get(id)
                    .map_or(true, |tracked| tracked.displayed().is_none())
            })
            .filter_map(|id| state.item_view(*id))
            .collect()
    }

    pub fn item(&self, content_id: ContentId) -> Option<ContentItem> {
        self.state().item_view(content_id)
    }

    pub fn decision_phase(&self, content_id: ContentId) -> Option<MutationPhase> {
        self.state()
            .decisions
            .get(&content_id)
            .map(|tracked| tracked.phase())
    }

    pub async fn publish(&self, content_id: ContentId) -> Result<ContentStatus, StoreError> {
        let api = self.api.clone();
        self.decide(content_id, ContentStatus::Published, async move {
            api.publish_content(content_id).await.map(|()| None)
        })
        .await
    }

    /// Publishes reviewed content. The server's item replaces the cached one.
    pub async fn approve(&self, content_id: ContentId) -> Result<ContentStatus, StoreError> {
        let api = self.api.clone();
        self.decide(content_id, ContentStatus::Published, async move {
            api.approve_content(content_id).await.map(Some)
        })
        .await
    }

    /// Turns the content down. The author sees it as rejected.
    pub async fn reject(
        &self,
        content_id: ContentId,
        reason: &str,
    ) -> Result<ContentStatus, StoreError> {
        let api = self.api.clone();
        let reason = reason.to_string();
        self.decide(content_id, ContentStatus::Rejected, async move {
            api.reject_content(content_id, &reason).await.map(|()| None)
        })
        .await
    }

    /// Moves `content_id` to `target` while `request` runs. A returned item
    /// replaces the cached one.
    async fn decide<F>(
        &self,
        content_id: ContentId,
        target: ContentStatus,
        request: F,
    ) -> Result<ContentStatus, StoreError>
    where
        F: Future<Output = ApiResult<Option<ContentItem>>>,
    {
        let epoch = self.permitted_epoch()?;
        let seq = self
            .state()
            .decisions
            .entry(content_id)
            .or_insert_with(|| Tracked::new(None))
            .begin(Some(target));
        debug!("Moderating content {} to {:?} (seq {})", content_id, target, seq);

        let result = request.await;
        self.ensure_epoch(epoch)?;

        let mut state = self.state();
        let Some(tracked) = state.decisions.get_mut(&content_id) else {
            return Err(StoreError::SessionChanged);
        };
        match result {
            Ok(returned) => {
                let status = returned.as_ref().map_or(target, |item| item.status);
                if tracked.confirm(seq, Some(status)) == Completion::Superseded {
                    debug!("Decision on content {} (seq {}) superseded", content_id, seq);
                }
                let confirmed = tracked.confirmed().unwrap_or(status);
                let displayed = tracked.displayed().unwrap_or(status);
                if let Some(item) = state.items.get_mut(&content_id) {
                    item.status = confirmed;
                }
                drop(state);
                if let Some(item) = returned {
                    self.engagement.upsert(item);
                }
                self.engagement
                    .patch_item(content_id, |item| item.status = confirmed);
                info!("Content {} is now {:?}", content_id, confirmed);
                Ok(displayed)
            }
            Err(err) => {
                if tracked.fail(seq) == Completion::Applied {
                    warn!("Decision on content {} failed, rolled back: {}", content_id, err);
                }
                Err(err.into())
            }
        }
    }

    /// Takes the content down for good.
    pub async fn remove(&self, content_id: ContentId) -> Result<(), StoreError> {
        let epoch = self.permitted_epoch()?;
        self.api.remove_content(content_id).await?;
        self.ensure_epoch(epoch)?;

        {
            let mut state = self.state();
            state.queue.retain(|id| *id != content_id);
            state.items.remove(&content_id);
            state.decisions.remove(&content_id);
        }
        self.engagement.forget(content_id);
        info!("Removed content {}", content_id);
        Ok(())
    }

    /// Loads flag reports. Flags with a resolution in flight stay as shown.
    pub async fn fetch_flags(&self, resolved: Option<bool>) -> Result<Vec<ContentFlag>, StoreError> {
        let epoch = self.permitted_epoch()?;
        let flags = self.api.list_flags(resolved).await?;
        self.ensure_epoch(epoch)?;

        let mut guard = self.state();
        let state = &mut *guard;
        let fetched: Vec<FlagId> = flags.iter().map(|flag| flag.id).collect();
        state
            .resolutions
            .retain(|id, tracked| tracked.is_pending() || fetched.contains(id));
        let resolutions = &state.resolutions;
        state.flags.retain(|id, _| resolutions.contains_key(id));
        for flag in flags {
            state
                .resolutions
                .entry(flag.id)
                .and_modify(|tracked| {
                    tracked.refresh(flag.is_resolved);
                })
                .or_insert_with(|| Tracked::new(flag.is_resolved));
            state.flags.insert(flag.id, flag);
        }
        state.flag_order = fetched;
        Ok(state
            .flag_order
            .iter()
            .filter_map(|id| state.flag_view(*id))
            .collect())
    }

    pub fn flags(&self) -> Vec<ContentFlag> {
        let state = self.state();
        state
            .flag_order
            .iter()
            .filter_map(|id| state.flag_view(*id))
            .collect()
    }

    pub fn open_flags(&self) -> Vec<ContentFlag> {
        self.flags()
            .into_iter()
            .filter(|flag| !flag.is_resolved)
            .collect()
    }

    /// Marks a flag resolved with the moderator's notes.
    ///
    /// When it was the last open flag on its content, the cached item is no
    /// longer shown as flagged.
    pub async fn resolve_flag(&self, flag_id: FlagId, admin_notes: &str) -> Result<(), StoreError> {
        let epoch = self.permitted_epoch()?;
        let seq = {
            let mut state = self.state();
            let Some(tracked) = state.resolutions.get_mut(&flag_id) else {
                return Err(StoreError::Api(ApiError::NotFound(format!(
                    "Flag {} is not loaded",
                    flag_id
                ))));
            };
            if *tracked.displayed() {
                return Ok(());
            }
            tracked.begin(true)
        };

        let result = self.api.resolve_flag(flag_id, admin_notes).await;
        self.ensure_epoch(epoch)?;

        let mut state = self.state();
        let Some(tracked) = state.resolutions.get_mut(&flag_id) else {
            return Err(StoreError::SessionChanged);
        };
        match result {
            Ok(()) => {
                tracked.confirm(seq, true);
                let content_id = match state.flags.get_mut(&flag_id) {
                    Some(flag) => {
                        flag.admin_notes = Some(admin_notes.to_string());
                        flag.content_id
                    }
                    None => return Ok(()),
                };
                let cleared = !state.has_open_flags(content_id);
                drop(state);
                if cleared {
                    self.engagement
                        .patch_item(content_id, |item| item.is_flagged = false);
                }
                info!("Resolved flag {} on content {}", flag_id, content_id);
                Ok(())
            }
            Err(err) => {
                if tracked.fail(seq) == Completion::Applied {
                    warn!("Resolving flag {} failed, rolled back: {}", flag_id, err);
                }
                Err(err.into())
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        let state = self.state();
        state.queue.is_empty() && state.flag_order.is_empty() && state.decisions.is_empty()
    }

    pub fn clear(&self) {
        *self.state() = ModerationState::default();
    }
}
