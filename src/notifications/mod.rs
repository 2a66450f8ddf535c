//! Notification list, read state and unread-count polling.

mod notification_store;
mod poller;

pub use notification_store::NotificationStore;
pub use poller::UnreadCountPoller;
