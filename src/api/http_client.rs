//! reqwest-backed implementation of the TechHub API traits.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

use super::api_traits::{
    AdminApi, ApiResult, AuthApi, AuthoringApi, CategoryApi, CommentApi, ContentApi,
    ModerationApi, NotificationApi, WishlistApi,
};
use super::error::ApiError;
use super::models::{
    AuthResponse, Category, CategoryId, Comment, CommentId, CommentLikeResponse, ContentDraft,
    ContentFlag, ContentId, ContentItem, ContentPage, ContentPatch, ContentQuery, FlagId,
    LoginRequest, NewCategory, NewComment, Notification, NotificationId, ProfileUpdate,
    ReactionRequest, ReactionResponse, RegisterRequest, RejectRequest, ResolveFlagRequest,
    RoleUpdate, UnreadCount, UserId, UserProfile, UserQuery,
};
use crate::session::UserRole;

/// HTTP client for the TechHub REST API.
///
/// One instance is shared by every store; the bearer token is swapped in place
/// by the session store on login and logout.
pub struct HttpApiClient {
    client: reqwest::Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl HttpApiClient {
    /// Create a new API client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the API (e.g., "http://localhost:8000/api")
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_auth_token(&self) -> bool {
        self.current_token().is_some()
    }

    fn current_token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match self.current_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> ApiResult<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!("API request failed with status {}: {}", status, body);
        Err(ApiError::from_status(status.as_u16(), &body))
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ApiResult<T> {
        let response = self.send(builder).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| ApiError::Decode(err.to_string()))
    }

    async fn send_empty(&self, builder: RequestBuilder) -> ApiResult<()> {
        self.send(builder).await.map(|_| ())
    }
}

#[async_trait]
impl AuthApi for HttpApiClient {
    fn set_auth_token(&self, token: Option<String>) {
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = token;
    }

    /// POST /auth/login
    async fn login(&self, request: &LoginRequest) -> ApiResult<AuthResponse> {
        self.send_json(self.request(Method::POST, "/auth/login").json(request))
            .await
    }

    /// POST /auth/register
    async fn register(&self, request: &RegisterRequest) -> ApiResult<AuthResponse> {
        self.send_json(self.request(Method::POST, "/auth/register").json(request))
            .await
    }

    /// GET /auth/me
    async fn current_user(&self) -> ApiResult<UserProfile> {
        self.send_json(self.request(Method::GET, "/auth/me")).await
    }

    /// PUT /auth/profile
    async fn update_profile(&self, update: &ProfileUpdate) -> ApiResult<UserProfile> {
        self.send_json(self.request(Method::PUT, "/auth/profile").json(update))
            .await
    }
}

#[async_trait]
impl ContentApi for HttpApiClient {
    /// GET /content?page&limit&category&search
    async fn list_content(&self, query: &ContentQuery) -> ApiResult<ContentPage> {
        self.send_json(self.request(Method::GET, "/content").query(query))
            .await
    }

    /// GET /content/{id}
    async fn get_content(&self, content_id: ContentId) -> ApiResult<ContentItem> {
        self.send_json(self.request(Method::GET, &format!("/content/{}", content_id)))
            .await
    }

    /// POST /content/{id}/like
    async fn set_reaction(
        &self,
        content_id: ContentId,
        is_like: Option<bool>,
    ) -> ApiResult<ReactionResponse> {
        self.send_json(
            self.request(Method::POST, &format!("/content/{}/like", content_id))
                .json(&ReactionRequest { is_like }),
        )
        .await
    }
}

#[async_trait]
impl WishlistApi for HttpApiClient {
    /// GET /wishlist
    async fn list_wishlist(&self) -> ApiResult<Vec<ContentItem>> {
        self.send_json(self.request(Method::GET, "/wishlist")).await
    }

    /// POST /wishlist/{content_id}
    async fn add_to_wishlist(&self, content_id: ContentId) -> ApiResult<()> {
        self.send_empty(self.request(Method::POST, &format!("/wishlist/{}", content_id)))
            .await
    }

    /// DELETE /wishlist/{content_id}
    async fn remove_from_wishlist(&self, content_id: ContentId) -> ApiResult<()> {
        self.send_empty(self.request(Method::DELETE, &format!("/wishlist/{}", content_id)))
            .await
    }
}

#[async_trait]
impl CategoryApi for HttpApiClient {
    /// GET /categories
    async fn list_categories(&self) -> ApiResult<Vec<Category>> {
        self.send_json(self.request(Method::GET, "/categories")).await
    }

    /// GET /categories/user/subscriptions
    async fn list_subscriptions(&self) -> ApiResult<Vec<Category>> {
        self.send_json(self.request(Method::GET, "/categories/user/subscriptions"))
            .await
    }

    /// POST /categories/{id}/subscribe
    async fn subscribe(&self, category_id: CategoryId) -> ApiResult<()> {
        self.send_empty(self.request(
            Method::POST,
            &format!("/categories/{}/subscribe", category_id),
        ))
        .await
    }

    /// DELETE /categories/{id}/subscribe
    async fn unsubscribe(&self, category_id: CategoryId) -> ApiResult<()> {
        self.send_empty(self.request(
            Method::DELETE,
            &format!("/categories/{}/subscribe", category_id),
        ))
        .await
    }
}

#[async_trait]
impl NotificationApi for HttpApiClient {
    /// GET /notifications
    async fn list_notifications(&self) -> ApiResult<Vec<Notification>> {
        self.send_json(self.request(Method::GET, "/notifications"))
            .await
    }

    /// GET /notifications/unread-count
    async fn unread_count(&self) -> ApiResult<u64> {
        let count: UnreadCount = self
            .send_json(self.request(Method::GET, "/notifications/unread-count"))
            .await?;
        Ok(count.unread_count)
    }

    /// PUT /notifications/{id}/read
    async fn mark_read(&self, notification_id: NotificationId) -> ApiResult<()> {
        self.send_empty(self.request(
            Method::PUT,
            &format!("/notifications/{}/read", notification_id),
        ))
        .await
    }

    /// PUT /notifications/mark-all-read
    async fn mark_all_read(&self) -> ApiResult<()> {
        self.send_empty(self.request(Method::PUT, "/notifications/mark-all-read"))
            .await
    }
}

#[async_trait]
impl CommentApi for HttpApiClient {
    /// GET /comments/content/{content_id}
    async fn list_comments(&self, content_id: ContentId) -> ApiResult<Vec<Comment>> {
        self.send_json(self.request(Method::GET, &format!("/comments/content/{}", content_id)))
            .await
    }

    /// POST /comments
    async fn add_comment(&self, comment: &NewComment) -> ApiResult<Comment> {
        self.send_json(self.request(Method::POST, "/comments").json(comment))
            .await
    }

    /// PUT /comments/{id}
    async fn update_comment(&self, comment_id: CommentId, text: &str) -> ApiResult<Comment> {
        self.send_json(
            self.request(Method::PUT, &format!("/comments/{}", comment_id))
                .json(&serde_json::json!({ "text": text })),
        )
        .await
    }

    /// DELETE /comments/{id}
    async fn delete_comment(&self, comment_id: CommentId) -> ApiResult<()> {
        self.send_empty(self.request(Method::DELETE, &format!("/comments/{}", comment_id)))
            .await
    }

    /// POST /comments/{id}/like
    async fn like_comment(&self, comment_id: CommentId) -> ApiResult<CommentLikeResponse> {
        self.send_json(self.request(Method::POST, &format!("/comments/{}/like", comment_id)))
            .await
    }

    /// POST /comments/{id}/report
    async fn report_comment(&self, comment_id: CommentId) -> ApiResult<()> {
        self.send_empty(self.request(Method::POST, &format!("/comments/{}/report", comment_id)))
            .await
    }
}

#[async_trait]
impl AuthoringApi for HttpApiClient {
    /// POST /content
    async fn create_content(&self, draft: &ContentDraft) -> ApiResult<ContentItem> {
        self.send_json(self.request(Method::POST, "/content").json(draft))
            .await
    }

    /// PUT /content/{id}
    async fn update_content(
        &self,
        content_id: ContentId,
        patch: &ContentPatch,
    ) -> ApiResult<ContentItem> {
        self.send_json(
            self.request(Method::PUT, &format!("/content/{}", content_id))
                .json(patch),
        )
        .await
    }

    /// DELETE /content/{id}
    async fn delete_content(&self, content_id: ContentId) -> ApiResult<()> {
        self.send_empty(self.request(Method::DELETE, &format!("/content/{}", content_id)))
            .await
    }
}

#[async_trait]
impl ModerationApi for HttpApiClient {
    /// GET /admin/pending-approval
    async fn list_pending_content(&self) -> ApiResult<Vec<ContentItem>> {
        self.send_json(self.request(Method::GET, "/admin/pending-approval"))
            .await
    }

    /// PUT /admin/{id}/publish
    async fn publish_content(&self, content_id: ContentId) -> ApiResult<()> {
        self.send_empty(self.request(Method::PUT, &format!("/admin/{}/publish", content_id)))
            .await
    }

    /// PUT /admin/content/{id}/approve
    async fn approve_content(&self, content_id: ContentId) -> ApiResult<ContentItem> {
        self.send_json(self.request(
            Method::PUT,
            &format!("/admin/content/{}/approve", content_id),
        ))
        .await
    }

    /// PUT /admin/{id}/reject-publication
    async fn reject_content(&self, content_id: ContentId, reason: &str) -> ApiResult<()> {
        self.send_empty(
            self.request(
                Method::PUT,
                &format!("/admin/{}/reject-publication", content_id),
            )
            .json(&RejectRequest {
                reason: reason.to_string(),
            }),
        )
        .await
    }

    /// DELETE /admin/content/{id}
    async fn remove_content(&self, content_id: ContentId) -> ApiResult<()> {
        self.send_empty(self.request(
            Method::DELETE,
            &format!("/admin/content/{}", content_id),
        ))
        .await
    }

    /// GET /admin/flags/all?resolved
    async fn list_flags(&self, resolved: Option<bool>) -> ApiResult<Vec<ContentFlag>> {
        let mut builder = self.request(Method::GET, "/admin/flags/all");
        if let Some(resolved) = resolved {
            builder = builder.query(&[("resolved", resolved)]);
        }
        self.send_json(builder).await
    }

    /// PUT /admin/flags/{id}/resolve
    async fn resolve_flag(&self, flag_id: FlagId, admin_notes: &str) -> ApiResult<()> {
        self.send_empty(
            self.request(Method::PUT, &format!("/admin/flags/{}/resolve", flag_id))
                .json(&ResolveFlagRequest {
                    admin_notes: admin_notes.to_string(),
                }),
        )
        .await
    }
}

#[async_trait]
impl AdminApi for HttpApiClient {
    /// GET /admin/users?role&is_active
    async fn list_users(&self, query: &UserQuery) -> ApiResult<Vec<UserProfile>> {
        self.send_json(self.request(Method::GET, "/admin/users").query(query))
            .await
    }

    /// PUT /admin/users/{id}/activate or /deactivate
    async fn set_user_active(&self, user_id: UserId, active: bool) -> ApiResult<()> {
        let action = if active { "activate" } else { "deactivate" };
        self.send_empty(self.request(
            Method::PUT,
            &format!("/admin/users/{}/{}", user_id, action),
        ))
        .await
    }

    /// PUT /admin/users/{id}/role
    async fn update_user_role(&self, user_id: UserId, role: UserRole) -> ApiResult<UserProfile> {
        self.send_json(
            self.request(Method::PUT, &format!("/admin/users/{}/role", user_id))
                .json(&RoleUpdate { role }),
        )
        .await
    }

    /// POST /admin/categories
    async fn create_category(&self, category: &NewCategory) -> ApiResult<Category> {
        self.send_json(self.request(Method::POST, "/admin/categories").json(category))
            .await
    }
}
