use chrono::Utc;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::models::{AuthError, Session, SessionPhase, SessionSnapshot};
use super::token_claims;
use super::token_store::TokenStore;
use crate::api::{
    ApiError, ApiResult, AuthApi, AuthResponse, LoginRequest, ProfileUpdate, RegisterRequest,
    UserProfile,
};
use crate::error::StoreError;

struct SessionState {
    phase: SessionPhase,
    epoch: u64,
    session: Option<Session>,
}

/// Owns the authenticated session and the persisted auth token.
///
/// Every phase change bumps the session epoch and publishes a new
/// [`SessionSnapshot`] to the receivers handed out by [`SessionStore::subscribe`].
pub struct SessionStore {
    api: Arc<dyn AuthApi>,
    tokens: Arc<dyn TokenStore>,
    state: Mutex<SessionState>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl SessionStore {
    pub fn new(api: Arc<dyn AuthApi>, tokens: Arc<dyn TokenStore>) -> Self {
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());
        Self {
            api,
            tokens,
            state: Mutex::new(SessionState {
                phase: SessionPhase::Anonymous,
                epoch: 0,
                session: None,
            }),
            snapshot_tx,
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Moves to `phase`, bumps the epoch and publishes the new snapshot.
    /// Must be called with the state lock held.
    fn transition(
        &self,
        state: &mut SessionState,
        phase: SessionPhase,
        session: Option<Session>,
    ) -> u64 {
        state.phase = phase;
        state.epoch += 1;
        state.session = session;
        self.snapshot_tx.send_replace(SessionSnapshot {
            epoch: state.epoch,
            session: state.session.clone(),
        });
        state.epoch
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state().phase
    }

    pub fn current(&self) -> Option<Session> {
        self.state().session.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase() == SessionPhase::Authenticated
    }

    pub async fn login(&self, credentials: &LoginRequest) -> Result<Session, AuthError> {
        self.authenticate(|| self.api.login(credentials), AuthError::from_login)
            .await
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<Session, AuthError> {
        self.authenticate(|| self.api.register(request), AuthError::from_register)
            .await
    }

    async fn authenticate<R, F>(
        &self,
        request: R,
        map_err: fn(ApiError) -> AuthError,
    ) -> Result<Session, AuthError>
    where
        R: FnOnce() -> F,
        F: Future<Output = ApiResult<AuthResponse>>,
    {
        let attempt_epoch = {
            let mut state = self.state();
            match state.phase {
                SessionPhase::Authenticating => return Err(AuthError::InProgress),
                SessionPhase::Authenticated => return Err(AuthError::AlreadyAuthenticated),
                SessionPhase::Anonymous => {}
            }
            self.transition(&mut state, SessionPhase::Authenticating, None)
        };

        let result = request().await;

        let mut state = self.state();
        if state.epoch != attempt_epoch {
            debug!("Discarding authentication result, session changed meanwhile");
            return Err(AuthError::Cancelled);
        }

        match result {
            Ok(response) => {
                if let Err(err) = self.tokens.save(&response.token) {
                    warn!("Failed to persist auth token: {:#}", err);
                }
                self.api.set_auth_token(Some(response.token.clone()));
                let session = Session {
                    user: response.user,
                    auth_token: response.token,
                };
                self.transition(
                    &mut state,
                    SessionPhase::Authenticated,
                    Some(session.clone()),
                );
                info!(
                    "Logged in as {} ({})",
                    session.user.username,
                    session.role().as_str()
                );
                Ok(session)
            }
            Err(err) => {
                self.transition(&mut state, SessionPhase::Anonymous, None);
                let err = map_err(err);
                debug!("Authentication failed: {}", err);
                Err(err)
            }
        }
    }

    /// Rehydrates the session from the persisted token, if it is still valid.
    ///
    /// Never fails: any problem leaves the store anonymous and returns `None`.
    /// Tokens the server rejects, or that are already expired, are removed.
    pub async fn restore_session(&self) -> Option<Session> {
        {
            let state = self.state();
            if state.phase != SessionPhase::Anonymous {
                return state.session.clone();
            }
        }

        let token = match self.tokens.load() {
            Ok(Some(token)) => token,
            Ok(None) => return None,
            Err(err) => {
                warn!("Failed to read persisted auth token: {:#}", err);
                return None;
            }
        };

        if token_claims::is_expired(&token, Utc::now()) {
            info!("Persisted auth token has expired, discarding it");
            self.clear_persisted_token();
            return None;
        }

        let attempt_epoch = {
            let mut state = self.state();
            if state.phase != SessionPhase::Anonymous {
                return state.session.clone();
            }
            self.transition(&mut state, SessionPhase::Authenticating, None)
        };

        self.api.set_auth_token(Some(token.clone()));
        let result = self.api.current_user().await;

        let mut state = self.state();
        if state.epoch != attempt_epoch {
            debug!("Discarding session restore result, session changed meanwhile");
            return None;
        }

        match result {
            Ok(user) => {
                let session = Session {
                    user,
                    auth_token: token,
                };
                self.transition(
                    &mut state,
                    SessionPhase::Authenticated,
                    Some(session.clone()),
                );
                info!("Restored session for {}", session.user.username);
                Some(session)
            }
            Err(err) => {
                self.api.set_auth_token(None);
                self.transition(&mut state, SessionPhase::Anonymous, None);
                match err {
                    ApiError::Unauthorized(_) | ApiError::Forbidden(_) => {
                        info!("Persisted auth token was rejected, discarding it");
                        self.clear_persisted_token();
                    }
                    other => debug!("Could not validate persisted auth token: {}", other),
                }
                None
            }
        }
    }

    /// Ends the session and forgets the persisted token.
    pub fn logout(&self) {
        self.end_session();
        info!("Logged out");
    }

    /// Ends the session after the server rejected its token.
    pub fn expire(&self) {
        if self.end_session() {
            warn!("Auth token rejected by the server, session expired");
        }
    }

    /// Returns whether there was anything to end.
    fn end_session(&self) -> bool {
        let mut state = self.state();
        self.clear_persisted_token();
        self.api.set_auth_token(None);
        if state.phase == SessionPhase::Anonymous {
            return false;
        }
        self.transition(&mut state, SessionPhase::Anonymous, None);
        true
    }

    fn clear_persisted_token(&self) {
        if let Err(err) = self.tokens.clear() {
            warn!("Failed to clear persisted auth token: {:#}", err);
        }
    }

    /// Sends a profile update and replaces the cached profile with the result.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, StoreError> {
        let epoch = {
            let state = self.state();
            if state.phase != SessionPhase::Authenticated {
                return Err(StoreError::NotAuthenticated);
            }
            state.epoch
        };

        let user = self.api.update_profile(update).await?;

        let mut state = self.state();
        if state.epoch != epoch {
            return Err(StoreError::SessionChanged);
        }
        if let Some(session) = state.session.as_mut() {
            session.user = user.clone();
        }
        // Same session, only the profile changed
        self.snapshot_tx.send_replace(SessionSnapshot {
            epoch: state.epoch,
            session: state.session.clone(),
        });
        Ok(user)
    }
}
