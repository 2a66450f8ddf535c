use async_trait::async_trait;

use super::error::ApiError;
use super::models::{
    AuthResponse, Category, CategoryId, Comment, CommentId, CommentLikeResponse, ContentDraft,
    ContentFlag, ContentId, ContentItem, ContentPage, ContentPatch, ContentQuery, FlagId,
    LoginRequest, NewCategory, NewComment, Notification, NotificationId, ProfileUpdate,
    ReactionResponse, RegisterRequest, UserId, UserProfile, UserQuery,
};
use crate::session::UserRole;

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Sets the bearer token attached to every subsequent request.
    /// `None` makes the following requests anonymous.
    fn set_auth_token(&self, token: Option<String>);

    /// Exchanges credentials for a token and the user's profile.
    async fn login(&self, request: &LoginRequest) -> ApiResult<AuthResponse>;

    /// Creates an account and returns a token for it.
    async fn register(&self, request: &RegisterRequest) -> ApiResult<AuthResponse>;

    /// Returns the profile the current token belongs to.
    /// Fails with `Unauthorized` if the token is no longer valid.
    async fn current_user(&self) -> ApiResult<UserProfile>;

    async fn update_profile(&self, update: &ProfileUpdate) -> ApiResult<UserProfile>;
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait ContentApi: Send + Sync {
    async fn list_content(&self, query: &ContentQuery) -> ApiResult<ContentPage>;

    async fn get_content(&self, content_id: ContentId) -> ApiResult<ContentItem>;

    /// Sets the caller's reaction to an absolute value: `Some(true)` like,
    /// `Some(false)` dislike, `None` no reaction.
    /// Returns the authoritative counts after the change.
    async fn set_reaction(
        &self,
        content_id: ContentId,
        is_like: Option<bool>,
    ) -> ApiResult<ReactionResponse>;
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait WishlistApi: Send + Sync {
    async fn list_wishlist(&self) -> ApiResult<Vec<ContentItem>>;

    async fn add_to_wishlist(&self, content_id: ContentId) -> ApiResult<()>;

    async fn remove_from_wishlist(&self, content_id: ContentId) -> ApiResult<()>;
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait CategoryApi: Send + Sync {
    async fn list_categories(&self) -> ApiResult<Vec<Category>>;

    /// Categories the current user is subscribed to.
    async fn list_subscriptions(&self) -> ApiResult<Vec<Category>>;

    async fn subscribe(&self, category_id: CategoryId) -> ApiResult<()>;

    async fn unsubscribe(&self, category_id: CategoryId) -> ApiResult<()>;
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait NotificationApi: Send + Sync {
    async fn list_notifications(&self) -> ApiResult<Vec<Notification>>;

    /// Lightweight poll: only the number of unread notifications.
    async fn unread_count(&self) -> ApiResult<u64>;

    async fn mark_read(&self, notification_id: NotificationId) -> ApiResult<()>;

    async fn mark_all_read(&self) -> ApiResult<()>;
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait CommentApi: Send + Sync {
    async fn list_comments(&self, content_id: ContentId) -> ApiResult<Vec<Comment>>;

    async fn add_comment(&self, comment: &NewComment) -> ApiResult<Comment>;

    async fn update_comment(&self, comment_id: CommentId, text: &str) -> ApiResult<Comment>;

    async fn delete_comment(&self, comment_id: CommentId) -> ApiResult<()>;

    /// Toggles the caller's like on a comment, returns the server truth.
    async fn like_comment(&self, comment_id: CommentId) -> ApiResult<CommentLikeResponse>;

    async fn report_comment(&self, comment_id: CommentId) -> ApiResult<()>;
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait AuthoringApi: Send + Sync {
    async fn create_content(&self, draft: &ContentDraft) -> ApiResult<ContentItem>;

    async fn update_content(
        &self,
        content_id: ContentId,
        patch: &ContentPatch,
    ) -> ApiResult<ContentItem>;

    /// Only the author or an admin may delete.
    async fn delete_content(&self, content_id: ContentId) -> ApiResult<()>;
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait ModerationApi: Send + Sync {
    /// Content waiting for a publish decision.
    async fn list_pending_content(&self) -> ApiResult<Vec<ContentItem>>;

    async fn publish_content(&self, content_id: ContentId) -> ApiResult<()>;

    /// Publishes after review, returns the published item.
    async fn approve_content(&self, content_id: ContentId) -> ApiResult<ContentItem>;

    async fn reject_content(&self, content_id: ContentId, reason: &str) -> ApiResult<()>;

    /// Takes any content item down, whatever its status.
    async fn remove_content(&self, content_id: ContentId) -> ApiResult<()>;

    /// `resolved` filters on resolution state, `None` lists every flag.
    async fn list_flags(&self, resolved: Option<bool>) -> ApiResult<Vec<ContentFlag>>;

    async fn resolve_flag(&self, flag_id: FlagId, admin_notes: &str) -> ApiResult<()>;
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait AdminApi: Send + Sync {
    async fn list_users(&self, query: &UserQuery) -> ApiResult<Vec<UserProfile>>;

    async fn set_user_active(&self, user_id: UserId, active: bool) -> ApiResult<()>;

    async fn update_user_role(&self, user_id: UserId, role: UserRole) -> ApiResult<UserProfile>;

    async fn create_category(&self, category: &NewCategory) -> ApiResult<Category>;
}

/// Combined trait for a client that talks to every TechHub endpoint.
pub trait TechHubApi:
    AuthApi
    + ContentApi
    + WishlistApi
    + CategoryApi
    + NotificationApi
    + CommentApi
    + AuthoringApi
    + ModerationApi
    + AdminApi
    + Send
    + Sync
{
}

impl<T> TechHubApi for T where
    T: AuthApi
        + ContentApi
        + WishlistApi
        + CategoryApi
        + NotificationApi
        + CommentApi
        + AuthoringApi
        + ModerationApi
        + AdminApi
        + Send
        + Sync
{
}
