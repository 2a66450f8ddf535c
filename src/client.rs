use anyhow::Result;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::api::{
    CategoryApi, Category, CategoryId, Comment, CommentId, ContentDraft, ContentFlag, ContentId,
    ContentItem, ContentPage, ContentPatch, ContentQuery, ContentStatus, FlagId, HttpApiClient,
    LoginRequest, NewCategory, NotificationId, ProfileUpdate, RegisterRequest, TechHubApi, UserId,
    UserProfile, UserQuery,
};
use crate::authoring::AuthoringStore;
use crate::comments::{CommentLike, CommentStore};
use crate::config::ClientConfig;
use crate::engagement::{EngagementStore, Reaction, ReactionState};
use crate::error::StoreError;
use crate::membership::{SubscriptionBackend, SubscriptionStore, WishlistBackend, WishlistStore};
use crate::moderation::{AdminStore, ModerationStore};
use crate::notices::{NoticeBoard, NoticeLevel};
use crate::notifications::{NotificationStore, UnreadCountPoller};
use crate::session::{AuthError, FileTokenStore, Session, SessionStore, TokenStore, UserRole};

/// One TechHub client: a session, the stores that depend on it and the
/// background unread-count poller.
///
/// Mutations go through the client so that failures are reported on the
/// [`NoticeBoard`] and a rejected token ends the session everywhere. The
/// stores are also reachable directly for reads.
pub struct TechHubClient {
    config: ClientConfig,
    categories_api: Arc<dyn CategoryApi>,
    session: SessionStore,
    engagement: Arc<EngagementStore>,
    wishlist: WishlistStore,
    subscriptions: SubscriptionStore,
    notifications: Arc<NotificationStore>,
    comments: CommentStore,
    authoring: AuthoringStore,
    moderation: ModerationStore,
    admin: AdminStore,
    notices: NoticeBoard,
    poller: Mutex<Option<UnreadCountPoller>>,
}

impl TechHubClient {
    pub fn new<A>(config: ClientConfig, api: Arc<A>, tokens: Arc<dyn TokenStore>) -> Self
    where
        A: TechHubApi + 'static,
    {
        let session = SessionStore::new(api.clone(), tokens);
        let engagement = Arc::new(EngagementStore::new(api.clone(), session.subscribe()));
        let wishlist = WishlistStore::new(WishlistBackend(api.clone()), session.subscribe());
        let subscriptions =
            SubscriptionStore::new(SubscriptionBackend(api.clone()), session.subscribe());
        let notifications = Arc::new(NotificationStore::new(api.clone(), session.subscribe()));
        let comments = CommentStore::new(api.clone(), session.subscribe());
        let authoring = AuthoringStore::new(api.clone(), engagement.clone(), session.subscribe());
        let moderation =
            ModerationStore::new(api.clone(), engagement.clone(), session.subscribe());
        let admin = AdminStore::new(api.clone(), session.subscribe());

        Self {
            config,
            categories_api: api,
            session,
            engagement,
            wishlist,
            subscriptions,
            notifications,
            comments,
            authoring,
            moderation,
            admin,
            notices: NoticeBoard::new(),
            poller: Mutex::new(None),
        }
    }

    /// Client talking HTTP to `config.api_base_url`, keeping its token in `config.token_path`.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let api = Arc::new(HttpApiClient::new(
            config.api_base_url.clone(),
            config.request_timeout(),
        )?);
        let tokens = Arc::new(FileTokenStore::new(config.token_path.clone()));
        Ok(Self::new(config, api, tokens))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn engagement(&self) -> &EngagementStore {
        &self.engagement
    }

    pub fn wishlist(&self) -> &WishlistStore {
        &self.wishlist
    }

    pub fn subscriptions(&self) -> &SubscriptionStore {
        &self.subscriptions
    }

    pub fn notifications(&self) -> &NotificationStore {
        &self.notifications
    }

    pub fn comments(&self) -> &CommentStore {
        &self.comments
    }

    pub fn authoring(&self) -> &AuthoringStore {
        &self.authoring
    }

    pub fn moderation(&self) -> &ModerationStore {
        &self.moderation
    }

    pub fn admin(&self) -> &AdminStore {
        &self.admin
    }

    pub fn notices(&self) -> &NoticeBoard {
        &self.notices
    }

    fn poller(&self) -> MutexGuard<'_, Option<UnreadCountPoller>> {
        self.poller.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_polling(&self) -> bool {
        self.poller()
            .as_ref()
            .is_some_and(UnreadCountPoller::is_running)
    }

    // Session lifecycle

    pub async fn login(&self, credentials: &LoginRequest) -> Result<Session, AuthError> {
        let session = self
            .session
            .login(credentials)
            .await
            .inspect_err(|err| self.report_auth_failure(err))?;
        self.start_session().await;
        Ok(session)
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<Session, AuthError> {
        let session = self
            .session
            .register(request)
            .await
            .inspect_err(|err| self.report_auth_failure(err))?;
        self.start_session().await;
        Ok(session)
    }

    /// Restores the persisted session, if any. Never reports an error.
    pub async fn restore_session(&self) -> Option<Session> {
        let session = self.session.restore_session().await?;
        self.start_session().await;
        Some(session)
    }

    /// Ends the session and drops every piece of user data held in memory.
    pub fn logout(&self) {
        self.session.logout();
        self.reset();
        self.notices.clear();
    }

    fn report_auth_failure(&self, err: &AuthError) {
        match err {
            AuthError::InProgress | AuthError::Cancelled => {}
            _ => {
                self.notices.push(NoticeLevel::Error, err.to_string());
            }
        }
    }

    /// Loads the user's collections in parallel, then starts polling.
    async fn start_session(&self) {
        let (wishlist, subscriptions, notifications, unread) = tokio::join!(
            self.wishlist.refresh(),
            self.subscriptions.refresh(),
            self.notifications.fetch_notifications(),
            self.notifications.refresh_unread_count(),
        );
        if let Err(err) = wishlist {
            warn!("Initial wishlist load failed: {}", err);
        }
        if let Err(err) = subscriptions {
            warn!("Initial subscriptions load failed: {}", err);
        }
        if let Err(err) = notifications {
            warn!("Initial notifications load failed: {}", err);
        }
        if let Err(err) = unread {
            warn!("Initial unread count load failed: {}", err);
        }

        if !self.session.is_authenticated() {
            return;
        }
        let poller = UnreadCountPoller::spawn(
            self.notifications.clone(),
            self.session.subscribe(),
            self.config.unread_poll_interval(),
        );
        // Replacing a previous poller drops and cancels it
        *self.poller() = Some(poller);
        debug!("Session started");
    }

    /// Stops polling and empties every store.
    fn reset(&self) {
        self.poller().take();
        self.engagement.clear();
        self.wishlist.clear();
        self.subscriptions.clear();
        self.notifications.clear();
        self.comments.clear();
        self.authoring.clear();
        self.moderation.clear();
        self.admin.clear();
    }

    fn expire_session(&self) {
        self.session.expire();
        self.reset();
        self.notices.push(
            NoticeLevel::Warning,
            "Your session has expired. Please log in again.",
        );
    }

    /// Reports a failed action. A rejected token ends the session.
    fn observe<T>(&self, action: &str, result: Result<T, StoreError>) -> Result<T, StoreError> {
        if let Err(err) = &result {
            if err.is_auth_rejection() {
                info!("{} failed with a rejected token", action);
                self.expire_session();
            } else if !matches!(err, StoreError::SessionChanged) {
                self.notices
                    .push(NoticeLevel::Error, format!("{}: {}", action, err));
            }
        }
        result
    }

    /// Like `observe`, for reads: only a rejected token is acted upon.
    fn observe_read<T>(&self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        if let Err(err) = &result {
            if err.is_auth_rejection() {
                self.expire_session();
            }
        }
        result
    }

    // Content

    /// Query for page `page` of the feed, sized from the config.
    pub fn feed_query(&self, page: u32) -> ContentQuery {
        ContentQuery {
            page: page.max(1),
            ..ContentQuery::first_page(self.config.feed_page_size)
        }
    }

    pub async fn fetch_feed(&self, query: &ContentQuery) -> Result<ContentPage, StoreError> {
        self.observe_read(self.engagement.fetch_feed(query).await)
    }

    pub async fn fetch_content(&self, content_id: ContentId) -> Result<ContentItem, StoreError> {
        self.observe_read(self.engagement.fetch_content(content_id).await)
    }

    pub async fn toggle_reaction(
        &self,
        content_id: ContentId,
        desired: Reaction,
    ) -> Result<ReactionState, StoreError> {
        let action = match desired {
            Reaction::Like => "Could not like this post",
            Reaction::Dislike => "Could not dislike this post",
        };
        self.observe(
            action,
            self.engagement.toggle_reaction(content_id, desired).await,
        )
    }

    // Wishlist and subscriptions

    pub async fn toggle_wishlist(&self, content_id: ContentId) -> Result<bool, StoreError> {
        self.observe(
            "Could not update your wishlist",
            self.wishlist.toggle(content_id).await,
        )
    }

    pub async fn toggle_subscription(&self, category_id: CategoryId) -> Result<bool, StoreError> {
        self.observe(
            "Could not update your subscriptions",
            self.subscriptions.toggle(category_id).await,
        )
    }

    /// Every category the user can subscribe to.
    pub async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let result = self
            .categories_api
            .list_categories()
            .await
            .map_err(StoreError::from);
        self.observe_read(result)
    }

    // Notifications

    pub async fn mark_read(&self, notification_id: NotificationId) -> Result<(), StoreError> {
        self.observe(
            "Could not mark the notification as read",
            self.notifications.mark_read(notification_id).await,
        )
    }

    pub async fn mark_all_read(&self) -> Result<(), StoreError> {
        self.observe(
            "Could not mark notifications as read",
            self.notifications.mark_all_read().await,
        )
    }

    // Comments

    pub async fn fetch_comments(&self, content_id: ContentId) -> Result<Vec<Comment>, StoreError> {
        self.observe_read(self.comments.fetch(content_id).await)
    }

    pub async fn add_comment(
        &self,
        content_id: ContentId,
        text: &str,
        parent_id: Option<CommentId>,
    ) -> Result<Comment, StoreError> {
        self.observe(
            "Could not post your comment",
            self.comments.add(content_id, text, parent_id).await,
        )
    }

    pub async fn update_comment(
        &self,
        comment_id: CommentId,
        text: &str,
    ) -> Result<Comment, StoreError> {
        self.observe(
            "Could not update your comment",
            self.comments.update(comment_id, text).await,
        )
    }

    pub async fn delete_comment(&self, comment_id: CommentId) -> Result<(), StoreError> {
        self.observe(
            "Could not delete the comment",
            self.comments.delete(comment_id).await,
        )
    }

    pub async fn report_comment(&self, comment_id: CommentId) -> Result<(), StoreError> {
        self.observe(
            "Could not report the comment",
            self.comments.report(comment_id).await,
        )
    }

    pub async fn toggle_comment_like(
        &self,
        comment_id: CommentId,
    ) -> Result<CommentLike, StoreError> {
        self.observe(
            "Could not like the comment",
            self.comments.toggle_like(comment_id).await,
        )
    }

    // Authoring

    pub async fn create_content(&self, draft: &ContentDraft) -> Result<ContentItem, StoreError> {
        self.observe(
            "Could not create the post",
            self.authoring.create(draft).await,
        )
    }

    pub async fn update_content(
        &self,
        content_id: ContentId,
        patch: &ContentPatch,
    ) -> Result<ContentItem, StoreError> {
        self.observe(
            "Could not save the post",
            self.authoring.update(content_id, patch).await,
        )
    }

    pub async fn submit_for_review(&self, content_id: ContentId) -> Result<ContentItem, StoreError> {
        self.observe(
            "Could not submit the post for review",
            self.authoring.submit_for_review(content_id).await,
        )
    }

    pub async fn delete_content(&self, content_id: ContentId) -> Result<(), StoreError> {
        self.observe(
            "Could not delete the post",
            self.authoring.delete(content_id).await,
        )
    }

    // Moderation

    pub async fn fetch_pending_content(&self) -> Result<Vec<ContentItem>, StoreError> {
        self.observe_read(self.moderation.fetch_pending().await)
    }

    pub async fn publish_content(&self, content_id: ContentId) -> Result<ContentStatus, StoreError> {
        self.observe(
            "Could not publish the post",
            self.moderation.publish(content_id).await,
        )
    }

    pub async fn approve_content(&self, content_id: ContentId) -> Result<ContentStatus, StoreError> {
        self.observe(
            "Could not approve the post",
            self.moderation.approve(content_id).await,
        )
    }

    pub async fn reject_content(
        &self,
        content_id: ContentId,
        reason: &str,
    ) -> Result<ContentStatus, StoreError> {
        self.observe(
            "Could not reject the post",
            self.moderation.reject(content_id, reason).await,
        )
    }

    pub async fn remove_content(&self, content_id: ContentId) -> Result<(), StoreError> {
        self.observe(
            "Could not remove the post",
            self.moderation.remove(content_id).await,
        )
    }

    pub async fn fetch_flags(&self, resolved: Option<bool>) -> Result<Vec<ContentFlag>, StoreError> {
        self.observe_read(self.moderation.fetch_flags(resolved).await)
    }

    pub async fn resolve_flag(&self, flag_id: FlagId, admin_notes: &str) -> Result<(), StoreError> {
        self.observe(
            "Could not resolve the report",
            self.moderation.resolve_flag(flag_id, admin_notes).await,
        )
    }

    // Administration

    pub async fn fetch_users(&self, query: &UserQuery) -> Result<Vec<UserProfile>, StoreError> {
        self.observe_read(self.admin.fetch_users(query).await)
    }

    pub async fn set_user_active(&self, user_id: UserId, active: bool) -> Result<(), StoreError> {
        let action = if active {
            "Could not activate the user"
        } else {
            "Could not deactivate the user"
        };
        self.observe(action, self.admin.set_active(user_id, active).await)
    }

    pub async fn update_user_role(
        &self,
        user_id: UserId,
        role: UserRole,
    ) -> Result<UserProfile, StoreError> {
        self.observe(
            "Could not change the user's role",
            self.admin.update_role(user_id, role).await,
        )
    }

    pub async fn create_category(&self, category: &NewCategory) -> Result<Category, StoreError> {
        self.observe(
            "Could not create the category",
            self.admin.create_category(category).await,
        )
    }

    // Profile

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, StoreError> {
        self.observe(
            "Could not update your profile",
            self.session.update_profile(update).await,
        )
    }
}
