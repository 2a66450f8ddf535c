use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::backend::{MembershipBackend, SubscriptionBackend, WishlistBackend};
use crate::error::StoreError;
use crate::reconcile::{Completion, MutationPhase, Tracked};
use crate::session::SessionSnapshot;

pub type WishlistStore = MembershipStore<WishlistBackend>;
pub type SubscriptionStore = MembershipStore<SubscriptionBackend>;

/// A set of ids with optimistic add/remove toggling.
pub struct MembershipStore<B: MembershipBackend> {
    backend: B,
    session: watch::Receiver<SessionSnapshot>,
    members: Mutex<HashMap<u64, Tracked<bool>>>,
}

impl<B: MembershipBackend> MembershipStore<B> {
    pub fn new(backend: B, session: watch::Receiver<SessionSnapshot>) -> Self {
        Self {
            backend,
            session,
            members: Mutex::new(HashMap::new()),
        }
    }

    fn members(&self) -> MutexGuard<'_, HashMap<u64, Tracked<bool>>> {
        self.members.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
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

    /// Flips membership of `id`. Returns whether it is a member afterwards.
    ///
    /// On failure the flip is undone and the set is resynchronized with the
    /// server before the error is returned.
    pub async fn toggle(&self, id: u64) -> Result<bool, StoreError> {
        let epoch = self.authenticated_epoch()?;

        let (seq, add) = {
            let mut members = self.members();
            let tracked = members.entry(id).or_insert_with(|| Tracked::new(false));
            let add = !*tracked.displayed();
            (tracked.begin(add), add)
        };
        debug!(
            "{}: {} {} (seq {})",
            self.backend.kind(),
            if add { "adding" } else { "removing" },
            id,
            seq
        );

        let result = if add {
            self.backend.add(id).await
        } else {
            self.backend.remove(id).await
        };

        if self.session_epoch() != epoch {
            return Err(StoreError::SessionChanged);
        }

        let err = {
            let mut members = self.members();
            let Some(tracked) = members.get_mut(&id) else {
                return Err(StoreError::SessionChanged);
            };
            match result {
                Ok(()) => {
                    if tracked.confirm(seq, add) == Completion::Superseded {
                        debug!(
                            "{}: toggle of {} (seq {}) superseded",
                            self.backend.kind(),
                            id,
                            seq
                        );
                    }
                    return Ok(*tracked.displayed());
                }
                Err(err) => {
                    if tracked.fail(seq) == Completion::Applied {
                        warn!(
                            "{}: toggle of {} failed, reverted: {}",
                            self.backend.kind(),
                            id,
                            err
                        );
                    }
                    err
                }
            }
        };

        if let Err(refresh_err) = self.refresh().await {
            debug!(
                "{}: resync after failed toggle also failed: {}",
                self.backend.kind(),
                refresh_err
            );
        }
        Err(err.into())
    }

    /// Replaces the local set with the server's list.
    ///
    /// Ids with any toggle in flight keep their local state and their entry,
    /// so late completions still land. A 404 from the list endpoint counts as
    /// an empty set.
    pub async fn refresh(&self) -> Result<BTreeSet<u64>, StoreError> {
        let epoch = self.authenticated_epoch()?;

        let listed: BTreeSet<u64> = match self.backend.list().await {
            Ok(ids) => ids.into_iter().collect(),
            Err(err) if err.is_not_found() => {
                info!("{}: list not found, treating as empty", self.backend.kind());
                BTreeSet::new()
            }
            Err(err) => return Err(err.into()),
        };

        if self.session_epoch() != epoch {
            return Err(StoreError::SessionChanged);
        }

        let mut members = self.members();
        for (id, tracked) in members.iter_mut() {
            tracked.refresh(listed.contains(id));
        }
        for id in &listed {
            members.entry(*id).or_insert_with(|| Tracked::new(true));
        }
        members.retain(|_, tracked| tracked.is_pending() || *tracked.displayed());

        debug!("{}: refreshed, {} members", self.backend.kind(), listed.len());
        Ok(Self::displayed_ids(&members))
    }

    fn displayed_ids(members: &HashMap<u64, Tracked<bool>>) -> BTreeSet<u64> {
        members
            .iter()
            .filter(|(_, tracked)| *tracked.displayed())
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.members()
            .get(&id)
            .is_some_and(|tracked| *tracked.displayed())
    }

    pub fn ids(&self) -> BTreeSet<u64> {
        Self::displayed_ids(&self.members())
    }

    pub fn phase(&self, id: u64) -> Option<MutationPhase> {
        self.members().get(&id).map(Tracked::phase)
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        !self.members().values().any(|tracked| *tracked.displayed())
    }

    pub fn clear(&self) {
        self.members().clear();
    }
}
