use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{AdminApi, ApiError, Category, NewCategory, UserId, UserProfile, UserQuery};
use crate::error::StoreError;
use crate::reconcile::{Completion, Tracked};
use crate::session::{Permission, SessionSnapshot, UserRole};

#[derive(Default)]
struct Directory {
    order: Vec<UserId>,
    users: HashMap<UserId, Tracked<UserProfile>>,
}

/// User directory for admins: listing, activation and roles.
pub struct AdminStore {
    api: Arc<dyn AdminApi>,
    session: watch::Receiver<SessionSnapshot>,
    directory: Mutex<Directory>,
}

impl AdminStore {
    pub fn new(api: Arc<dyn AdminApi>, session: watch::Receiver<SessionSnapshot>) -> Self {
        Self {
            api,
            session,
            directory: Mutex::new(Directory::default()),
        }
    }

    fn directory(&self) -> MutexGuard<'_, Directory> {
        self.directory
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_epoch(&self, epoch: u64) -> Result<(), StoreError> {
        if self.session.borrow().epoch != epoch {
            return Err(StoreError::SessionChanged);
        }
        Ok(())
    }

    pub async fn fetch_users(&self, query: &UserQuery) -> Result<Vec<UserProfile>, StoreError> {
        let epoch = self.session.borrow().require(Permission::ManageUsers)?;
        let users = self.api.list_users(query).await?;
        self.ensure_epoch(epoch)?;

        let mut guard = self.directory();
        let directory = &mut *guard;
        let fetched: Vec<UserId> = users.iter().map(|user| user.id).collect();
        directory
            .users
            .retain(|id, tracked| tracked.is_pending() || fetched.contains(id));
        for user in users {
            directory
                .users
                .entry(user.id)
                .and_modify(|tracked| {
                    tracked.refresh(user.clone());
                })
                .or_insert_with(|| Tracked::new(user));
        }
        directory.order = fetched;
        debug!("Loaded {} users", directory.order.len());
        Ok(list(directory))
    }

    pub fn users(&self) -> Vec<UserProfile> {
        list(&self.directory())
    }

    pub fn user(&self, user_id: UserId) -> Option<UserProfile> {
        self.directory()
            .users
            .get(&user_id)
            .map(|tracked| tracked.displayed().clone())
    }

    /// Activates or deactivates a listed user. Setting the current value
    /// sends nothing.
    pub async fn set_active(&self, user_id: UserId, active: bool) -> Result<(), StoreError> {
        let epoch = self.session.borrow().require(Permission::ManageUsers)?;
        let (seq, predicted) = {
            let mut directory = self.directory();
            let Some(tracked) = directory.users.get_mut(&user_id) else {
                return Err(not_loaded(user_id));
            };
            if tracked.displayed().is_active == active {
                return Ok(());
            }
            let predicted = UserProfile {
                is_active: active,
                ..tracked.displayed().clone()
            };
            (tracked.begin(predicted.clone()), predicted)
        };

        let result = self.api.set_user_active(user_id, active).await;
        self.ensure_epoch(epoch)?;

        let mut directory = self.directory();
        let Some(tracked) = directory.users.get_mut(&user_id) else {
            return Err(StoreError::SessionChanged);
        };
        match result {
            Ok(()) => {
                tracked.confirm(seq, predicted);
                info!("User {} is now {}", user_id, if active { "active" } else { "inactive" });
                Ok(())
            }
            Err(err) => {
                if tracked.fail(seq) == Completion::Applied {
                    warn!("Changing activation of user {} failed, rolled back: {}", user_id, err);
                }
                Err(err.into())
            }
        }
    }

    pub async fn update_role(
        &self,
        user_id: UserId,
        role: UserRole,
    ) -> Result<UserProfile, StoreError> {
        let epoch = self.session.borrow().require(Permission::ManageUsers)?;
        let seq = {
            let mut directory = self.directory();
            let Some(tracked) = directory.users.get_mut(&user_id) else {
                return Err(not_loaded(user_id));
            };
            let predicted = UserProfile {
                role,
                ..tracked.displayed().clone()
            };
            tracked.begin(predicted)
        };

        let result = self.api.update_user_role(user_id, role).await;
        self.ensure_epoch(epoch)?;

        let mut directory = self.directory();
        let Some(tracked) = directory.users.get_mut(&user_id) else {
            return Err(StoreError::SessionChanged);
        };
        match result {
            Ok(profile) => {
                tracked.confirm(seq, profile);
                info!("User {} now has role {}", user_id, role);
                Ok(tracked.displayed().clone())
            }
            Err(err) => {
                if tracked.fail(seq) == Completion::Applied {
                    warn!("Changing role of user {} failed, rolled back: {}", user_id, err);
                }
                Err(err.into())
            }
        }
    }

    pub async fn create_category(&self, category: &NewCategory) -> Result<Category, StoreError> {
        let epoch = self.session.borrow().require(Permission::ManageCategories)?;
        let created = self.api.create_category(category).await?;
        self.ensure_epoch(epoch)?;
        info!("Created category {} ({})", created.id, created.name);
        Ok(created)
    }

    pub fn is_empty(&self) -> bool {
        self.directory().users.is_empty()
    }

    pub fn clear(&self) {
        *self.directory() = Directory::default();
    }
}

fn list(directory: &Directory) -> Vec<UserProfile> {
    directory
        .order
        .iter()
        .filter_map(|id| directory.users.get(id))
        .map(|tracked| tracked.displayed().clone())
        .collect()
}

fn not_loaded(user_id: UserId) -> StoreError {
    StoreError::Api(ApiError::NotFound(format!("User {} is not loaded", user_id)))
}
