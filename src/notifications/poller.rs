use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::notification_store::NotificationStore;
use crate::session::SessionSnapshot;

/// Background task that refreshes the unread counter on a fixed interval.
///
/// The task exits on its own as soon as the session it was started for ends,
/// and can be stopped explicitly with [`UnreadCountPoller::stop`]. Dropping the
/// poller also stops it.
pub struct UnreadCountPoller {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl UnreadCountPoller {
    /// Spawns the polling task. The first poll happens one `interval` after start.
    pub fn spawn(
        store: Arc<NotificationStore>,
        mut session: watch::Receiver<SessionSnapshot>,
        interval: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let started_epoch = session.borrow_and_update().epoch;
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("Unread count polling started, every {:?}", interval);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Unread count polling cancelled");
                        break;
                    }
                    changed = session.changed() => {
                        let ended = changed.is_err() || {
                            let snapshot = session.borrow_and_update();
                            !snapshot.is_authenticated() || snapshot.epoch != started_epoch
                        };
                        if ended {
                            debug!("Session ended, unread count polling stops");
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            result = store.refresh_unread_count() => match result {
                                Ok(count) => debug!("Polled unread count: {}", count),
                                Err(err) => debug!("Unread count poll failed: {}", err),
                            },
                        }
                    }
                }
            }
            info!("Unread count polling stopped");
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops polling and waits for the task to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for UnreadCountPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
