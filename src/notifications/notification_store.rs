use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::{Notification, NotificationApi, NotificationId};
use crate::error::StoreError;
use crate::session::SessionSnapshot;

#[derive(Debug, Clone, Default)]
struct NotificationState {
    notifications: Vec<Notification>,
    unread_count: u64,
}

impl NotificationState {
    fn recount(&mut self) {
        self.unread_count = self.notifications.iter().filter(|n| !n.is_read).count() as u64;
    }
}

/// The user's notifications and the unread badge counter.
///
/// The counter is updated from three sources: full list fetches, the
/// lightweight unread-count poll, and local mark-read mutations. A full fetch
/// always recomputes it from the list.
pub struct NotificationStore {
    api: Arc<dyn NotificationApi>,
    session: watch::Receiver<SessionSnapshot>,
    state: Mutex<NotificationState>,
}

impl NotificationStore {
    pub fn new(api: Arc<dyn NotificationApi>, session: watch::Receiver<SessionSnapshot>) -> Self {
        Self {
            api,
            session,
            state: Mutex::new(NotificationState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, NotificationState> {
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

    fn ensure_epoch(&self, epoch: u64) -> Result<(), StoreError> {
        if self.session_epoch() != epoch {
            return Err(StoreError::SessionChanged);
        }
        Ok(())
    }

    pub async fn fetch_notifications(&self) -> Result<Vec<Notification>, StoreError> {
        let epoch = self.authenticated_epoch()?;
        let notifications = self.api.list_notifications().await?;
        self.ensure_epoch(epoch)?;

        let mut state = self.state();
        state.notifications = notifications;
        state.recount();
        debug!(
            "Fetched {} notifications, {} unread",
            state.notifications.len(),
            state.unread_count
        );
        Ok(state.notifications.clone())
    }

    /// Fetches only the unread counter.
    pub async fn refresh_unread_count(&self) -> Result<u64, StoreError> {
        let epoch = self.authenticated_epoch()?;
        let count = self.api.unread_count().await?;
        self.ensure_epoch(epoch)?;

        self.state().unread_count = count;
        Ok(count)
    }

    /// Marks one notification read.
    ///
    /// Already-read notifications are left alone without contacting the server.
    pub async fn mark_read(&self, notification_id: NotificationId) -> Result<(), StoreError> {
        let epoch = self.authenticated_epoch()?;

        let decremented = {
            let mut guard = self.state();
            let state = &mut *guard;
            match state
                .notifications
                .iter_mut()
                .find(|n| n.id == notification_id)
            {
                Some(notification) if notification.is_read => return Ok(()),
                Some(notification) => {
                    notification.is_read = true;
                    let decremented = state.unread_count > 0;
                    state.unread_count = state.unread_count.saturating_sub(1);
                    Some(decremented)
                }
                None => None,
            }
        };

        let result = self.api.mark_read(notification_id).await;
        self.ensure_epoch(epoch)?;

        let Err(err) = result else {
            return Ok(());
        };

        if let Some(decremented) = decremented {
            let mut guard = self.state();
            let state = &mut *guard;
            if let Some(notification) = state
                .notifications
                .iter_mut()
                .find(|n| n.id == notification_id && n.is_read)
            {
                notification.is_read = false;
                if decremented {
                    state.unread_count += 1;
                }
            }
            warn!(
                "Marking notification {} read failed, reverted: {}",
                notification_id, err
            );
        }
        Err(err.into())
    }

    /// Marks every notification read, or nothing if the server refuses.
    pub async fn mark_all_read(&self) -> Result<(), StoreError> {
        let epoch = self.authenticated_epoch()?;

        let previous = {
            let mut state = self.state();
            let previous = state.clone();
            for notification in state.notifications.iter_mut() {
                notification.is_read = true;
            }
            state.unread_count = 0;
            previous
        };

        let result = self.api.mark_all_read().await;
        self.ensure_epoch(epoch)?;

        if let Err(err) = result {
            *self.state() = previous;
            warn!("Marking all notifications read failed, reverted: {}", err);
            return Err(err.into());
        }
        Ok(())
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.state().notifications.clone()
    }

    pub fn unread_count(&self) -> u64 {
        self.state().unread_count
    }

    pub fn is_empty(&self) -> bool {
        let state = self.state();
        state.notifications.is_empty() && state.unread_count == 0
    }

    pub fn clear(&self) {
        *self.state() = NotificationState::default();
    }
}
