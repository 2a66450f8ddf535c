//! In-process fake of the TechHub REST API
//!
//! Each test gets its own axum server on a random port, seeded from
//! `fixtures::seeded_state()`. Handlers implement just enough of the real
//! API for the client: bearer-token auth, reactions, wishlist, category
//! subscriptions, notifications, threaded comments, authoring and the admin
//! endpoints. Role checks answer 403 the way the real API does.
//!
//! Failures are injected per route with `TestServer::fail_next`, and every
//! request is counted so tests can assert whether the client called the
//! server at all.

use super::constants::*;
use super::fixtures::{seeded_state, FakeState, FakeUser};
use axum::extract::{Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use techhub_sync::api::{
    AuthResponse, Category, Comment, CommentId, CommentLikeResponse, ContentDraft, ContentFlag,
    ContentId, ContentItem, ContentPage, ContentPatch, ContentQuery, ContentStatus, FlagId,
    LoginRequest, NewCategory, NewComment, Notification, Pagination, ProfileUpdate,
    ReactionRequest, ReactionResponse, RegisterRequest, RejectRequest, ResolveFlagRequest,
    RoleUpdate, UnreadCount, UserId, UserProfile, UserQuery,
};
use techhub_sync::UserRole;
use tokio::net::TcpListener;

type Shared = Arc<Mutex<FakeState>>;
type Failure = (StatusCode, Json<Value>);
type Reply<T> = Result<Json<T>, Failure>;

fn failure(status: StatusCode, detail: &str) -> Failure {
    (status, Json(json!({ "detail": detail })))
}

fn not_found(what: &str) -> Failure {
    failure(StatusCode::NOT_FOUND, &format!("{} not found", what))
}

fn ok_message(message: &str) -> Reply<Value> {
    Ok(Json(json!({ "message": message })))
}

fn lock(shared: &Shared) -> MutexGuard<'_, FakeState> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl FakeState {
    /// Counts the request and pops an injected failure for `route`, if any.
    fn enter(&mut self, route: &'static str) -> Result<(), Failure> {
        *self.hits.entry(route).or_default() += 1;
        match self.faults.get_mut(route).and_then(|queue| queue.pop_front()) {
            Some(status) => Err(failure(
                StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                "Injected failure",
            )),
            None => Ok(()),
        }
    }

    fn viewer(&self, headers: &HeaderMap) -> Option<UserId> {
        let token = headers
            .get(AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")?;
        self.tokens.get(token).copied()
    }

    fn authenticate(&self, headers: &HeaderMap) -> Result<UserId, Failure> {
        self.viewer(headers)
            .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, "Could not validate credentials"))
    }

    /// Authenticates and checks the caller's role against `allowed`.
    fn authorize(&self, headers: &HeaderMap, allowed: &[UserRole]) -> Result<UserId, Failure> {
        let user_id = self.authenticate(headers)?;
        let role = self
            .users
            .iter()
            .find(|user| user.profile.id == user_id)
            .map(|user| user.profile.role);
        match role {
            Some(role) if allowed.contains(&role) => Ok(user_id),
            _ => Err(failure(StatusCode::FORBIDDEN, "Not enough permissions")),
        }
    }

    fn content_mut(&mut self, content_id: ContentId) -> Result<&mut ContentItem, Failure> {
        self.content
            .get_mut(&content_id)
            .ok_or_else(|| not_found("Content"))
    }

    fn user_mut(&mut self, user_id: UserId) -> Result<&mut FakeUser, Failure> {
        self.users
            .iter_mut()
            .find(|user| user.profile.id == user_id)
            .ok_or_else(|| not_found("User"))
    }

    fn content_view(&self, item: &ContentItem, viewer: Option<UserId>) -> ContentItem {
        let mut item = item.clone();
        item.user_reaction = viewer.and_then(|user| self.reactions.get(&(user, item.id)).copied());
        item
    }

    fn thread(
        &self,
        content_id: ContentId,
        parent_id: Option<CommentId>,
        viewer: Option<UserId>,
    ) -> Vec<Comment> {
        self.comments
            .iter()
            .filter(|c| c.content_id == content_id && c.parent_id == parent_id)
            .map(|c| self.comment_view(c, viewer))
            .collect()
    }

    fn comment_view(&self, comment: &Comment, viewer: Option<UserId>) -> Comment {
        let mut comment = comment.clone();
        comment.is_liked =
            viewer.is_some_and(|user| self.comment_likes.contains(&(user, comment.id)));
        comment.replies = self.thread(comment.content_id, Some(comment.id), viewer);
        comment
    }

    fn comment_index(&self, comment_id: CommentId) -> Result<usize, Failure> {
        self.comments
            .iter()
            .position(|c| c.id == comment_id)
            .ok_or_else(|| not_found("Comment"))
    }
}

// ============================================================================
// Auth
// ============================================================================

async fn login(State(shared): State<Shared>, Json(request): Json<LoginRequest>) -> Reply<AuthResponse> {
    let mut state = lock(&shared);
    state.enter("auth.login")?;

    let user = state
        .users
        .iter()
        .find(|user| {
            let identifier_matches = match (&request.email, &request.username) {
                (Some(email), _) => &user.profile.email == email,
                (None, Some(username)) => &user.profile.username == username,
                (None, None) => false,
            };
            identifier_matches && user.password == request.password
        })
        .map(|user| user.profile.clone())
        .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, "Incorrect email or password"))?;

    if !user.is_active {
        return Err(failure(
            StatusCode::FORBIDDEN,
            "Your account has been deactivated. Contact support.",
        ));
    }

    let token = state.issue_token(user.id);
    Ok(Json(AuthResponse { token, user }))
}

async fn register(
    State(shared): State<Shared>,
    Json(request): Json<RegisterRequest>,
) -> Reply<AuthResponse> {
    let mut state = lock(&shared);
    state.enter("auth.register")?;

    if request.password.len() < 8 {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "detail": [{
                    "loc": ["body", "password"],
                    "msg": "String should have at least 8 characters",
                    "type": "string_too_short"
                }]
            })),
        ));
    }
    if state
        .users
        .iter()
        .any(|u| u.profile.email == request.email || u.profile.username == request.username)
    {
        return Err(failure(
            StatusCode::CONFLICT,
            "Email or username already registered",
        ));
    }

    let user = UserProfile {
        id: state.next_id(),
        username: request.username,
        email: request.email,
        full_name: request.full_name,
        role: request.role,
        bio: None,
        avatar_url: None,
        is_active: true,
    };
    state.users.push(FakeUser {
        profile: user.clone(),
        password: request.password,
    });
    let token = state.issue_token(user.id);
    Ok(Json(AuthResponse { token, user }))
}

async fn current_user(State(shared): State<Shared>, headers: HeaderMap) -> Reply<UserProfile> {
    let mut state = lock(&shared);
    state.enter("auth.me")?;
    let user_id = state.authenticate(&headers)?;
    Ok(Json(state.user_mut(user_id)?.profile.clone()))
}

async fn update_profile(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(update): Json<ProfileUpdate>,
) -> Reply<UserProfile> {
    let mut state = lock(&shared);
    state.enter("auth.profile")?;
    let user_id = state.authenticate(&headers)?;
    let profile = &mut state.user_mut(user_id)?.profile;
    if let Some(full_name) = update.full_name {
        profile.full_name = Some(full_name);
    }
    if let Some(bio) = update.bio {
        profile.bio = Some(bio);
    }
    if let Some(avatar_url) = update.avatar_url {
        profile.avatar_url = Some(avatar_url);
    }
    Ok(Json(profile.clone()))
}

// ============================================================================
// Content
// ============================================================================

async fn list_content(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<ContentQuery>,
) -> Reply<ContentPage> {
    let mut state = lock(&shared);
    state.enter("content.list")?;
    let viewer = state.viewer(&headers);

    let search = query.search.as_deref().map(str::to_lowercase);
    let matching: Vec<ContentItem> = state
        .content
        .values()
        .filter(|item| item.status == ContentStatus::Published)
        .filter(|item| query.category.map_or(true, |c| item.category_id == Some(c)))
        .filter(|item| {
            search
                .as_deref()
                .map_or(true, |s| item.title.to_lowercase().contains(s))
        })
        .map(|item| state.content_view(item, viewer))
        .collect();

    let limit = query.limit.max(1) as usize;
    let page = query.page.max(1);
    let total = matching.len();
    let items = matching
        .into_iter()
        .skip((page as usize - 1) * limit)
        .take(limit)
        .collect();

    Ok(Json(ContentPage {
        items,
        pagination: Pagination {
            page,
            total_pages: total.div_ceil(limit).max(1) as u32,
            total: total as u64,
        },
    }))
}

async fn get_content(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(content_id): Path<ContentId>,
) -> Reply<ContentItem> {
    let mut state = lock(&shared);
    state.enter("content.get")?;
    let viewer = state.viewer(&headers);
    let item = state
        .content
        .get(&content_id)
        .ok_or_else(|| not_found("Content"))?;
    Ok(Json(state.content_view(item, viewer)))
}

async fn set_reaction(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(content_id): Path<ContentId>,
    Json(request): Json<ReactionRequest>,
) -> Reply<ReactionResponse> {
    let mut guard = lock(&shared);
    guard.enter("content.like")?;
    let user_id = guard.authenticate(&headers)?;

    let state = &mut *guard;
    let item = state
        .content
        .get_mut(&content_id)
        .ok_or_else(|| not_found("Content"))?;

    match state.reactions.remove(&(user_id, content_id)) {
        Some(true) => item.likes_count = item.likes_count.saturating_sub(1),
        Some(false) => item.dislikes_count = item.dislikes_count.saturating_sub(1),
        None => {}
    }
    match request.is_like {
        Some(true) => item.likes_count += 1,
        Some(false) => item.dislikes_count += 1,
        None => {}
    }
    if let Some(is_like) = request.is_like {
        state.reactions.insert((user_id, content_id), is_like);
    }

    Ok(Json(ReactionResponse {
        likes_count: item.likes_count,
        dislikes_count: item.dislikes_count,
        is_like: request.is_like,
    }))
}

// ============================================================================
// Wishlist
// ============================================================================

async fn list_wishlist(State(shared): State<Shared>, headers: HeaderMap) -> Reply<Vec<ContentItem>> {
    let mut state = lock(&shared);
    state.enter("wishlist.list")?;
    let user_id = state.authenticate(&headers)?;

    // Users who never saved anything get a 404, not an empty list
    let ids = state
        .wishlists
        .get(&user_id)
        .ok_or_else(|| not_found("Wishlist"))?;
    let items = ids
        .iter()
        .filter_map(|id| state.content.get(id))
        .map(|item| state.content_view(item, Some(user_id)))
        .collect();
    Ok(Json(items))
}

async fn add_to_wishlist(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(content_id): Path<ContentId>,
) -> Reply<Value> {
    let mut state = lock(&shared);
    state.enter("wishlist.add")?;
    let user_id = state.authenticate(&headers)?;
    if !state.content.contains_key(&content_id) {
        return Err(not_found("Content"));
    }
    if !state.wishlists.entry(user_id).or_default().insert(content_id) {
        return Err(failure(StatusCode::BAD_REQUEST, "Already in wishlist"));
    }
    ok_message("Added to wishlist")
}

async fn remove_from_wishlist(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(content_id): Path<ContentId>,
) -> Reply<Value> {
    let mut state = lock(&shared);
    state.enter("wishlist.remove")?;
    let user_id = state.authenticate(&headers)?;
    let removed = state
        .wishlists
        .get_mut(&user_id)
        .is_some_and(|ids| ids.remove(&content_id));
    if !removed {
        return Err(not_found("Wishlist item"));
    }
    ok_message("Removed from wishlist")
}

// ============================================================================
// Categories
// ============================================================================

async fn list_categories(State(shared): State<Shared>) -> Reply<Vec<Category>> {
    let mut state = lock(&shared);
    state.enter("categories.list")?;
    Ok(Json(state.categories.clone()))
}

async fn list_subscriptions(
    State(shared): State<Shared>,
    headers: HeaderMap,
) -> Reply<Vec<Category>> {
    let mut state = lock(&shared);
    state.enter("subscriptions.list")?;
    let user_id = state.authenticate(&headers)?;
    let subscribed = state.subscriptions.get(&user_id).cloned().unwrap_or_default();
    let categories = state
        .categories
        .iter()
        .filter(|category| subscribed.contains(&category.id))
        .cloned()
        .collect();
    Ok(Json(categories))
}

async fn subscribe(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(category_id): Path<u64>,
) -> Reply<Value> {
    let mut state = lock(&shared);
    state.enter("subscriptions.add")?;
    let user_id = state.authenticate(&headers)?;
    if !state.categories.iter().any(|c| c.id == category_id) {
        return Err(not_found("Category"));
    }
    state
        .subscriptions
        .entry(user_id)
        .or_insert_with(BTreeSet::new)
        .insert(category_id);
    ok_message("Subscribed")
}

async fn unsubscribe(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(category_id): Path<u64>,
) -> Reply<Value> {
    let mut state = lock(&shared);
    state.enter("subscriptions.remove")?;
    let user_id = state.authenticate(&headers)?;
    if let Some(ids) = state.subscriptions.get_mut(&user_id) {
        ids.remove(&category_id);
    }
    ok_message("Unsubscribed")
}

// ============================================================================
// Notifications
// ============================================================================

async fn list_notifications(
    State(shared): State<Shared>,
    headers: HeaderMap,
) -> Reply<Vec<Notification>> {
    let mut state = lock(&shared);
    state.enter("notifications.list")?;
    let user_id = state.authenticate(&headers)?;
    Ok(Json(
        state.notifications.get(&user_id).cloned().unwrap_or_default(),
    ))
}

async fn unread_count(State(shared): State<Shared>, headers: HeaderMap) -> Reply<UnreadCount> {
    let mut state = lock(&shared);
    state.enter("notifications.unread")?;
    let user_id = state.authenticate(&headers)?;
    let unread_count = state
        .notifications
        .get(&user_id)
        .map_or(0, |list| list.iter().filter(|n| !n.is_read).count() as u64);
    Ok(Json(UnreadCount { unread_count }))
}

async fn mark_read(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(notification_id): Path<u64>,
) -> Reply<Value> {
    let mut state = lock(&shared);
    state.enter("notifications.read")?;
    let user_id = state.authenticate(&headers)?;
    let notification = state
        .notifications
        .get_mut(&user_id)
        .and_then(|list| list.iter_mut().find(|n| n.id == notification_id))
        .ok_or_else(|| not_found("Notification"))?;
    notification.is_read = true;
    ok_message("Notification marked as read")
}

async fn mark_all_read(State(shared): State<Shared>, headers: HeaderMap) -> Reply<Value> {
    let mut state = lock(&shared);
    state.enter("notifications.read_all")?;
    let user_id = state.authenticate(&headers)?;
    if let Some(list) = state.notifications.get_mut(&user_id) {
        list.iter_mut().for_each(|n| n.is_read = true);
    }
    ok_message("All notifications marked as read")
}

// ============================================================================
// Comments
// ============================================================================

#[derive(Deserialize)]
struct CommentText {
    text: String,
}

fn empty_text() -> Failure {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({
            "detail": [{
                "loc": ["body", "text"],
                "msg": "Comment cannot be empty",
                "type": "value_error"
            }]
        })),
    )
}

async fn list_comments(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(content_id): Path<ContentId>,
) -> Reply<Vec<Comment>> {
    let mut state = lock(&shared);
    state.enter("comments.list")?;
    if !state.content.contains_key(&content_id) {
        return Err(not_found("Content"));
    }
    let viewer = state.viewer(&headers);
    Ok(Json(state.thread(content_id, None, viewer)))
}

async fn add_comment(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(request): Json<NewComment>,
) -> Reply<Comment> {
    let mut state = lock(&shared);
    state.enter("comments.add")?;
    let user_id = state.authenticate(&headers)?;

    if request.text.trim().is_empty() {
        return Err(empty_text());
    }
    if !state.content.contains_key(&request.content_id) {
        return Err(not_found("Content"));
    }
    if let Some(parent_id) = request.parent_id {
        let index = state.comment_index(parent_id)?;
        if state.comments[index].content_id != request.content_id {
            return Err(failure(
                StatusCode::BAD_REQUEST,
                "Parent comment belongs to other content",
            ));
        }
    }

    let comment = Comment {
        id: state.next_id(),
        content_id: request.content_id,
        author_id: user_id,
        text: request.text,
        parent_id: request.parent_id,
        likes_count: 0,
        is_liked: false,
        replies: Vec::new(),
    };
    state.comments.push(comment.clone());
    Ok(Json(comment))
}

async fn update_comment(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(comment_id): Path<CommentId>,
    Json(body): Json<CommentText>,
) -> Reply<Comment> {
    let mut state = lock(&shared);
    state.enter("comments.update")?;
    let user_id = state.authenticate(&headers)?;
    let index = state.comment_index(comment_id)?;
    if state.comments[index].author_id != user_id {
        return Err(failure(
            StatusCode::FORBIDDEN,
            "Not authorized to edit this comment",
        ));
    }
    if body.text.trim().is_empty() {
        return Err(empty_text());
    }
    state.comments[index].text = body.text;
    let comment = state.comments[index].clone();
    Ok(Json(state.comment_view(&comment, Some(user_id))))
}

async fn delete_comment(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(comment_id): Path<CommentId>,
) -> Reply<Value> {
    let mut state = lock(&shared);
    state.enter("comments.delete")?;
    let user_id = state.authenticate(&headers)?;
    let index = state.comment_index(comment_id)?;
    if state.comments[index].author_id != user_id {
        return Err(failure(
            StatusCode::FORBIDDEN,
            "Not authorized to delete this comment",
        ));
    }

    // Replies go with their parent
    let mut doomed = vec![comment_id];
    let mut cursor = 0;
    while cursor < doomed.len() {
        let parent = doomed[cursor];
        doomed.extend(
            state
                .comments
                .iter()
                .filter(|c| c.parent_id == Some(parent))
                .map(|c| c.id),
        );
        cursor += 1;
    }
    state.comments.retain(|c| !doomed.contains(&c.id));
    ok_message("Comment deleted")
}

async fn like_comment(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(comment_id): Path<CommentId>,
) -> Reply<CommentLikeResponse> {
    let mut state = lock(&shared);
    state.enter("comments.like")?;
    let user_id = state.authenticate(&headers)?;
    let index = state.comment_index(comment_id)?;

    let is_liked = if state.comment_likes.remove(&(user_id, comment_id)) {
        state.comments[index].likes_count = state.comments[index].likes_count.saturating_sub(1);
        false
    } else {
        state.comment_likes.insert((user_id, comment_id));
        state.comments[index].likes_count += 1;
        true
    };

    Ok(Json(CommentLikeResponse {
        comment_id,
        likes_count: state.comments[index].likes_count,
        is_liked,
    }))
}

async fn report_comment(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(comment_id): Path<CommentId>,
) -> Reply<Value> {
    let mut state = lock(&shared);
    state.enter("comments.report")?;
    let user_id = state.authenticate(&headers)?;
    state.comment_index(comment_id)?;
    state.reported_comments.push((user_id, comment_id));
    ok_message("Comment reported")
}

// ============================================================================
// Authoring
// ============================================================================

const WRITERS: &[UserRole] = &[UserRole::TechWriter, UserRole::Admin];
const ADMINS: &[UserRole] = &[UserRole::Admin];

async fn create_content(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(draft): Json<ContentDraft>,
) -> Reply<ContentItem> {
    let mut state = lock(&shared);
    state.enter("content.create")?;
    let user_id = state.authorize(&headers, WRITERS)?;
    if draft.title.trim().is_empty() {
        return Err(failure(StatusCode::BAD_REQUEST, "Title is required"));
    }
    if !state.categories.iter().any(|c| c.id == draft.category_id) {
        return Err(not_found("Category"));
    }

    let item = ContentItem {
        id: state.next_id(),
        title: draft.title,
        author_id: user_id,
        content_type: draft.content_type,
        status: ContentStatus::Draft,
        category_id: Some(draft.category_id),
        likes_count: 0,
        dislikes_count: 0,
        is_flagged: false,
        user_reaction: None,
    };
    state.content.insert(item.id, item.clone());
    Ok(Json(item))
}

/// Only the author or an admin may touch a content item.
fn check_owner(state: &FakeState, headers: &HeaderMap, content_id: ContentId, action: &str) -> Result<(), Failure> {
    let user_id = state.authenticate(headers)?;
    let is_admin = state.authorize(headers, ADMINS).is_ok();
    let item = state
        .content
        .get(&content_id)
        .ok_or_else(|| not_found("Content"))?;
    if item.author_id != user_id && !is_admin {
        return Err(failure(
            StatusCode::FORBIDDEN,
            &format!("Not authorized to {} this content", action),
        ));
    }
    Ok(())
}

async fn update_content(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(content_id): Path<ContentId>,
    Json(patch): Json<ContentPatch>,
) -> Reply<ContentItem> {
    let mut state = lock(&shared);
    state.enter("content.update")?;
    check_owner(&state, &headers, content_id, "update")?;
    let viewer = state.viewer(&headers);
    let item = state.content_mut(content_id)?;
    patch.apply_to(item);
    let item = item.clone();
    Ok(Json(state.content_view(&item, viewer)))
}

async fn delete_content(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(content_id): Path<ContentId>,
) -> Reply<Value> {
    let mut state = lock(&shared);
    state.enter("content.delete")?;
    check_owner(&state, &headers, content_id, "delete")?;
    state.content.remove(&content_id);
    ok_message("Content deleted successfully")
}

// ============================================================================
// Moderation
// ============================================================================

async fn list_pending(State(shared): State<Shared>, headers: HeaderMap) -> Reply<Vec<ContentItem>> {
    let mut state = lock(&shared);
    state.enter("admin.pending")?;
    state.authorize(&headers, WRITERS)?;
    let pending = state
        .content
        .values()
        .filter(|item| item.status == ContentStatus::Review)
        .cloned()
        .collect();
    Ok(Json(pending))
}

fn set_status(state: &mut FakeState, content_id: ContentId, status: ContentStatus) -> Result<ContentItem, Failure> {
    let item = state.content_mut(content_id)?;
    item.status = status;
    Ok(item.clone())
}

async fn publish_content(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(content_id): Path<ContentId>,
) -> Reply<Value> {
    let mut state = lock(&shared);
    state.enter("admin.publish")?;
    state.authorize(&headers, WRITERS)?;
    set_status(&mut state, content_id, ContentStatus::Published)?;
    ok_message("Content published")
}

async fn approve_content(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(content_id): Path<ContentId>,
) -> Reply<ContentItem> {
    let mut state = lock(&shared);
    state.enter("admin.approve")?;
    state.authorize(&headers, WRITERS)?;
    Ok(Json(set_status(
        &mut state,
        content_id,
        ContentStatus::Published,
    )?))
}

async fn reject_content(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(content_id): Path<ContentId>,
    Json(request): Json<RejectRequest>,
) -> Reply<Value> {
    let mut state = lock(&shared);
    state.enter("admin.reject")?;
    state.authorize(&headers, WRITERS)?;
    set_status(&mut state, content_id, ContentStatus::Rejected)?;
    state.rejections.insert(content_id, request.reason);
    ok_message("Content rejected")
}

async fn remove_content(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(content_id): Path<ContentId>,
) -> Reply<Value> {
    let mut state = lock(&shared);
    state.enter("admin.remove")?;
    state.authorize(&headers, ADMINS)?;
    state
        .content
        .remove(&content_id)
        .ok_or_else(|| not_found("Content"))?;
    state.flags.retain(|flag| flag.content_id != content_id);
    ok_message("Content removed")
}

#[derive(Deserialize)]
struct FlagFilter {
    resolved: Option<bool>,
}

async fn list_flags(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Query(filter): Query<FlagFilter>,
) -> Reply<Vec<ContentFlag>> {
    let mut state = lock(&shared);
    state.enter("admin.flags")?;
    state.authorize(&headers, WRITERS)?;
    let flags = state
        .flags
        .iter()
        .filter(|flag| filter.resolved.map_or(true, |r| flag.is_resolved == r))
        .cloned()
        .collect();
    Ok(Json(flags))
}

async fn resolve_flag(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(flag_id): Path<FlagId>,
    Json(request): Json<ResolveFlagRequest>,
) -> Reply<Value> {
    let mut guard = lock(&shared);
    guard.enter("admin.resolve")?;
    guard.authorize(&headers, WRITERS)?;

    let state = &mut *guard;
    let flag = state
        .flags
        .iter_mut()
        .find(|flag| flag.id == flag_id)
        .ok_or_else(|| not_found("Flag"))?;
    flag.is_resolved = true;
    flag.admin_notes = Some(request.admin_notes);
    let content_id = flag.content_id;
    let still_open = state
        .flags
        .iter()
        .any(|flag| flag.content_id == content_id && !flag.is_resolved);
    if let Some(item) = state.content.get_mut(&content_id) {
        item.is_flagged = still_open;
    }
    ok_message("Flag resolved")
}

// ============================================================================
// Administration
// ============================================================================

async fn list_users(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<UserQuery>,
) -> Reply<Vec<UserProfile>> {
    let mut state = lock(&shared);
    state.enter("admin.users")?;
    state.authorize(&headers, ADMINS)?;
    let users = state
        .users
        .iter()
        .map(|user| &user.profile)
        .filter(|profile| query.role.map_or(true, |role| profile.role == role))
        .filter(|profile| query.is_active.map_or(true, |active| profile.is_active == active))
        .cloned()
        .collect();
    Ok(Json(users))
}

fn set_active(shared: &Shared, headers: &HeaderMap, route: &'static str, user_id: UserId, active: bool) -> Reply<Value> {
    let mut state = lock(shared);
    state.enter(route)?;
    let admin_id = state.authorize(headers, ADMINS)?;
    if admin_id == user_id {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            "Cannot change your own account status",
        ));
    }
    state.user_mut(user_id)?.profile.is_active = active;
    if !active {
        state.tokens.retain(|_, owner| *owner != user_id);
    }
    ok_message(if active { "User activated" } else { "User deactivated" })
}

async fn activate_user(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(user_id): Path<UserId>,
) -> Reply<Value> {
    set_active(&shared, &headers, "admin.activate", user_id, true)
}

async fn deactivate_user(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(user_id): Path<UserId>,
) -> Reply<Value> {
    set_active(&shared, &headers, "admin.deactivate", user_id, false)
}

async fn update_role(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(user_id): Path<UserId>,
    Json(update): Json<RoleUpdate>,
) -> Reply<UserProfile> {
    let mut state = lock(&shared);
    state.enter("admin.role")?;
    let admin_id = state.authorize(&headers, ADMINS)?;
    if admin_id == user_id {
        return Err(failure(StatusCode::BAD_REQUEST, "Cannot change your own role"));
    }
    let profile = &mut state.user_mut(user_id)?.profile;
    profile.role = update.role;
    Ok(Json(profile.clone()))
}

async fn create_category(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(request): Json<NewCategory>,
) -> Reply<Category> {
    let mut state = lock(&shared);
    state.enter("admin.categories")?;
    state.authorize(&headers, ADMINS)?;
    if state.categories.iter().any(|c| c.name == request.name) {
        return Err(failure(StatusCode::BAD_REQUEST, "Category already exists"));
    }
    let category = Category {
        id: state.next_id(),
        name: request.name,
        description: request.description,
    };
    state.categories.push(category.clone());
    Ok(Json(category))
}

fn make_app(shared: Shared) -> Router {
    let api = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/me", get(current_user))
        .route("/auth/profile", put(update_profile))
        .route("/content", get(list_content).post(create_content))
        .route(
            "/content/{id}",
            get(get_content).put(update_content).delete(delete_content),
        )
        .route("/content/{id}/like", post(set_reaction))
        .route("/wishlist", get(list_wishlist))
        .route(
            "/wishlist/{id}",
            post(add_to_wishlist).delete(remove_from_wishlist),
        )
        .route("/categories", get(list_categories))
        .route("/categories/user/subscriptions", get(list_subscriptions))
        .route(
            "/categories/{id}/subscribe",
            post(subscribe).delete(unsubscribe),
        )
        .route("/notifications", get(list_notifications))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/mark-all-read", put(mark_all_read))
        .route("/notifications/{id}/read", put(mark_read))
        .route("/comments", post(add_comment))
        .route("/comments/content/{id}", get(list_comments))
        .route(
            "/comments/{id}",
            put(update_comment).delete(delete_comment),
        )
        .route("/comments/{id}/like", post(like_comment))
        .route("/comments/{id}/report", post(report_comment))
        .route("/admin/pending-approval", get(list_pending))
        .route("/admin/{id}/publish", put(publish_content))
        .route("/admin/{id}/reject-publication", put(reject_content))
        .route("/admin/content/{id}", delete(remove_content))
        .route("/admin/content/{id}/approve", put(approve_content))
        .route("/admin/flags/all", get(list_flags))
        .route("/admin/flags/{id}/resolve", put(resolve_flag))
        .route("/admin/users", get(list_users))
        .route("/admin/users/{id}/activate", put(activate_user))
        .route("/admin/users/{id}/deactivate", put(deactivate_user))
        .route("/admin/users/{id}/role", put(update_role))
        .route("/admin/categories", post(create_category))
        .with_state(shared);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/api", api)
}

/// Fake TechHub API instance with its own seeded state
///
/// When dropped, the server gracefully shuts down.
pub struct TestServer {
    /// Base URL of the API, including the `/api` prefix
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    state: Shared,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new fake server on a random port and waits until it answers.
    ///
    /// # Panics
    ///
    /// Panics if binding fails or the server does not become ready in time.
    pub async fn spawn() -> Self {
        let shared: Shared = Arc::new(Mutex::new(seeded_state()));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let app = make_app(shared.clone());

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url: format!("http://127.0.0.1:{}/api", port),
            port,
            state: shared,
            _shutdown_tx: Some(shutdown_tx),
        };
        server.wait_for_ready().await;
        server
    }

    /// Direct access to the server's data.
    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        lock(&self.state)
    }

    /// The next request to `route` fails with `status`. Calls stack up.
    pub fn fail_next(&self, route: &'static str, status: u16) {
        self.state()
            .faults
            .entry(route)
            .or_default()
            .push_back(status);
    }

    /// Number of requests `route` has received, including failed ones.
    pub fn hits(&self, route: &'static str) -> usize {
        self.state().hits.get(route).copied().unwrap_or(0)
    }

    /// Invalidates every issued token, as if they all expired.
    pub fn revoke_tokens(&self) {
        self.state().tokens.clear();
    }

    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");
        let health_url = format!("http://127.0.0.1:{}/health", self.port);

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(&health_url).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
