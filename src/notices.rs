//! Transient, dismissible messages for the user.
//!
//! Failed mutations post a notice here after their local state was rolled
//! back, so the failure is never silent even though the display already
//! returned to the previous state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

pub type NoticeId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub id: NoticeId,
    pub level: NoticeLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct NoticeBoard {
    notices: Mutex<Vec<Notice>>,
}

impl NoticeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn notices_mut(&self) -> MutexGuard<'_, Vec<Notice>> {
        self.notices.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, level: NoticeLevel, message: impl Into<String>) -> NoticeId {
        let notice = Notice {
            id: Uuid::new_v4(),
            level,
            message: message.into(),
            created_at: Utc::now(),
        };
        let id = notice.id;
        self.notices_mut().push(notice);
        id
    }

    /// Returns false if no notice had that id.
    pub fn dismiss(&self, id: NoticeId) -> bool {
        let mut notices = self.notices_mut();
        let before = notices.len();
        notices.retain(|notice| notice.id != id);
        notices.len() != before
    }

    /// Oldest first.
    pub fn notices(&self) -> Vec<Notice> {
        self.notices_mut().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.notices_mut().is_empty()
    }

    pub fn clear(&self) {
        self.notices_mut().clear();
    }
}
