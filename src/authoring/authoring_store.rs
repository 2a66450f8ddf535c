use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{AuthoringApi, ContentDraft, ContentId, ContentItem, ContentPatch, ContentStatus};
use crate::engagement::EngagementStore;
use crate::error::StoreError;
use crate::reconcile::{Completion, Tracked};
use crate::session::{Permission, SessionSnapshot};

/// Content items the writer created or edited in this session.
///
/// Edits show up at once and roll back if the server refuses them. Every
/// confirmed change is also written into the shared content cache, so the feed
/// and detail views see it.
pub struct AuthoringStore {
    api: Arc<dyn AuthoringApi>,
    engagement: Arc<EngagementStore>,
    session: watch::Receiver<SessionSnapshot>,
    works: Mutex<BTreeMap<ContentId, Tracked<ContentItem>>>,
}

impl AuthoringStore {
    pub fn new(
        api: Arc<dyn AuthoringApi>,
        engagement: Arc<EngagementStore>,
        session: watch::Receiver<SessionSnapshot>,
    ) -> Self {
        Self {
            api,
            engagement,
            session,
            works: Mutex::new(BTreeMap::new()),
        }
    }

    fn state(&self) -> MutexGuard<'_, BTreeMap<ContentId, Tracked<ContentItem>>> {
        self.works.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn permitted_epoch(&self) -> Result<u64, StoreError> {
        self.session.borrow().require(Permission::CreateContent)
    }

    fn ensure_epoch(&self, epoch: u64) -> Result<(), StoreError> {
        if self.session.borrow().epoch != epoch {
            return Err(StoreError::SessionChanged);
        }
        Ok(())
    }

    /// Creates a draft. It stays out of the public feed until published.
    pub async fn create(&self, draft: &ContentDraft) -> Result<ContentItem, StoreError> {
        let epoch = self.permitted_epoch()?;
        let item = self.api.create_content(draft).await?;
        self.ensure_epoch(epoch)?;

        info!("Created content {} as {:?}", item.id, item.status);
        self.state().insert(item.id, Tracked::new(item.clone()));
        self.engagement.upsert(item.clone());
        Ok(item)
    }

    /// Applies `patch` to a content item.
    pub async fn update(
        &self,
        content_id: ContentId,
        patch: &ContentPatch,
    ) -> Result<ContentItem, StoreError> {
        let epoch = self.permitted_epoch()?;

        let seq = self.state().get_mut(&content_id).map(|tracked| {
            let mut predicted = tracked.displayed().clone();
            patch.apply_to(&mut predicted);
            tracked.begin(predicted)
        });
        debug!("Updating content {} (seq {:?})", content_id, seq);

        let result = self.api.update_content(content_id, patch).await;
        self.ensure_epoch(epoch)?;

        let mut works = self.state();
        match (result, seq) {
            (Ok(item), Some(seq)) => {
                let Some(tracked) = works.get_mut(&content_id) else {
                    return Err(StoreError::SessionChanged);
                };
                if tracked.confirm(seq, item.clone()) == Completion::Superseded {
                    debug!("Update of content {} (seq {}) superseded", content_id, seq);
                }
                self.engagement.upsert(tracked.confirmed().clone());
                Ok(tracked.displayed().clone())
            }
            (Ok(item), None) => {
                let tracked = works
                    .entry(content_id)
                    .or_insert_with(|| Tracked::new(item.clone()));
                tracked.refresh(item.clone());
                self.engagement.upsert(item.clone());
                Ok(item)
            }
            (Err(err), Some(seq)) => {
                if let Some(tracked) = works.get_mut(&content_id) {
                    if tracked.fail(seq) == Completion::Applied {
                        warn!("Update of content {} failed, rolled back: {}", content_id, err);
                    }
                }
                Err(err.into())
            }
            (Err(err), None) => Err(err.into()),
        }
    }

    /// Hands a draft to the moderators.
    pub async fn submit_for_review(&self, content_id: ContentId) -> Result<ContentItem, StoreError> {
        self.update(content_id, &ContentPatch::submit_for_review())
            .await
    }

    pub async fn delete(&self, content_id: ContentId) -> Result<(), StoreError> {
        let epoch = self.permitted_epoch()?;
        self.api.delete_content(content_id).await?;
        self.ensure_epoch(epoch)?;

        self.state().remove(&content_id);
        self.engagement.forget(content_id);
        info!("Deleted content {}", content_id);
        Ok(())
    }

    pub fn get(&self, content_id: ContentId) -> Option<ContentItem> {
        self.state()
            .get(&content_id)
            .map(|tracked| tracked.displayed().clone())
    }

    /// Everything written this session, by id.
    pub fn authored(&self) -> Vec<ContentItem> {
        self.state()
            .values()
            .map(|tracked| tracked.displayed().clone())
            .collect()
    }

    pub fn with_status(&self, status: ContentStatus) -> Vec<ContentItem> {
        self.authored()
            .into_iter()
            .filter(|item| item.status == status)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.state().is_empty()
    }

    pub fn clear(&self) {
        self.state().clear();
    }
}
