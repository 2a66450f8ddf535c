use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::{ApiError, Comment, CommentApi, CommentId, ContentId, NewComment};
use crate::error::StoreError;
use crate::reconcile::{Completion, Tracked};
use crate::session::SessionSnapshot;

/// Like state of a single comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentLike {
    pub is_liked: bool,
    pub likes_count: u64,
}

impl CommentLike {
    fn of(comment: &Comment) -> Self {
        Self {
            is_liked: comment.is_liked,
            likes_count: comment.likes_count,
        }
    }

    fn flipped(self) -> Self {
        if self.is_liked {
            Self {
                is_liked: false,
                likes_count: self.likes_count.saturating_sub(1),
            }
        } else {
            Self {
                is_liked: true,
                likes_count: self.likes_count + 1,
            }
        }
    }
}

fn find_mut(comments: &mut [Comment], id: CommentId) -> Option<&mut Comment> {
    for comment in comments.iter_mut() {
        if comment.id == id {
            return Some(comment);
        }
        if let Some(found) = find_mut(&mut comment.replies, id) {
            return Some(found);
        }
    }
    None
}

fn remove(comments: &mut Vec<Comment>, id: CommentId) -> bool {
    if let Some(pos) = comments.iter().position(|c| c.id == id) {
        comments.remove(pos);
        return true;
    }
    comments.iter_mut().any(|c| remove(&mut c.replies, id))
}

fn visit(comments: &[Comment], f: &mut impl FnMut(&Comment)) {
    for comment in comments {
        f(comment);
        visit(&comment.replies, f);
    }
}

fn overlay(comments: &mut [Comment], likes: &HashMap<CommentId, Tracked<CommentLike>>) {
    for comment in comments.iter_mut() {
        if let Some(tracked) = likes.get(&comment.id) {
            let like = tracked.displayed();
            comment.is_liked = like.is_liked;
            comment.likes_count = like.likes_count;
        }
        overlay(&mut comment.replies, likes);
    }
}

#[derive(Default)]
struct CommentState {
    content_id: Option<ContentId>,
    thread: Vec<Comment>,
    likes: HashMap<CommentId, Tracked<CommentLike>>,
}

impl CommentState {
    fn track_likes(&mut self, comments: &[Comment]) {
        let likes = &mut self.likes;
        visit(comments, &mut |comment| match likes.get_mut(&comment.id) {
            Some(tracked) => {
                tracked.refresh(CommentLike::of(comment));
            }
            None => {
                likes.insert(comment.id, Tracked::new(CommentLike::of(comment)));
            }
        });
    }

    fn view(&self) -> Vec<Comment> {
        let mut thread = self.thread.clone();
        overlay(&mut thread, &self.likes);
        thread
    }
}

/// Comment thread of the content item currently being viewed.
pub struct CommentStore {
    api: Arc<dyn CommentApi>,
    session: watch::Receiver<SessionSnapshot>,
    state: Mutex<CommentState>,
}

impl CommentStore {
    pub fn new(api: Arc<dyn CommentApi>, session: watch::Receiver<SessionSnapshot>) -> Self {
        Self {
            api,
            session,
            state: Mutex::new(CommentState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, CommentState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
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

    fn ensure_epoch(&self, epoch: u64) -> Result<(), StoreError> {
        if self.session_epoch() != epoch {
            return Err(StoreError::SessionChanged);
        }
        Ok(())
    }

    /// Loads the thread of `content_id`, replacing whatever was loaded before.
    pub async fn fetch(&self, content_id: ContentId) -> Result<Vec<Comment>, StoreError> {
        let epoch = self.session_epoch();
        let thread = self.api.list_comments(content_id).await?;
        self.ensure_epoch(epoch)?;

        let mut state = self.state();
        if state.content_id != Some(content_id) {
            state.likes.clear();
        }
        state.content_id = Some(content_id);
        state.track_likes(&thread);
        state.thread = thread;
        Ok(state.view())
    }

    /// Posts a comment, or a reply when `parent_id` is set.
    pub async fn add(
        &self,
        content_id: ContentId,
        text: &str,
        parent_id: Option<CommentId>,
    ) -> Result<Comment, StoreError> {
        let epoch = self.authenticated_epoch()?;
        let comment = self
            .api
            .add_comment(&NewComment {
                content_id,
                text: text.to_string(),
                parent_id,
            })
            .await?;
        self.ensure_epoch(epoch)?;

        let mut state = self.state();
        if state.content_id == Some(comment.content_id) {
            let placed = match parent_id {
                None => {
                    state.thread.push(comment.clone());
                    true
                }
                Some(parent_id) => match find_mut(&mut state.thread, parent_id) {
                    Some(parent) => {
                        parent.replies.push(comment.clone());
                        true
                    }
                    None => {
                        debug!(
                            "Parent {} of reply {} is not loaded, the next fetch places it",
                            parent_id, comment.id
                        );
                        false
                    }
                },
            };
            if placed {
                state.track_likes(std::slice::from_ref(&comment));
            }
        }
        debug!("Added comment {} to content {}", comment.id, content_id);
        Ok(comment)
    }

    pub async fn update(&self, comment_id: CommentId, text: &str) -> Result<Comment, StoreError> {
        let epoch = self.authenticated_epoch()?;
        let updated = self.api.update_comment(comment_id, text).await?;
        self.ensure_epoch(epoch)?;

        let mut state = self.state();
        if let Some(comment) = find_mut(&mut state.thread, comment_id) {
            comment.text = updated.text.clone();
        }
        Ok(updated)
    }

    pub async fn delete(&self, comment_id: CommentId) -> Result<(), StoreError> {
        let epoch = self.authenticated_epoch()?;
        self.api.delete_comment(comment_id).await?;
        self.ensure_epoch(epoch)?;

        let mut state = self.state();
        remove(&mut state.thread, comment_id);
        state.likes.remove(&comment_id);
        Ok(())
    }

    pub async fn report(&self, comment_id: CommentId) -> Result<(), StoreError> {
        self.authenticated_epoch()?;
        self.api.report_comment(comment_id).await?;
        debug!("Reported comment {}", comment_id);
        Ok(())
    }

    /// Likes or unlikes a comment, replies included.
    pub async fn toggle_like(&self, comment_id: CommentId) -> Result<CommentLike, StoreError> {
        let epoch = self.authenticated_epoch()?;

        let seq = {
            let mut state = self.state();
            let Some(tracked) = state.likes.get_mut(&comment_id) else {
                return Err(StoreError::Api(ApiError::NotFound(format!(
                    "comment {} is not loaded",
                    comment_id
                ))));
            };
            let predicted = tracked.displayed().flipped();
            tracked.begin(predicted)
        };

        let result = self.api.like_comment(comment_id).await;
        self.ensure_epoch(epoch)?;

        let mut state = self.state();
        let Some(tracked) = state.likes.get_mut(&comment_id) else {
            return Err(StoreError::SessionChanged);
        };
        match result {
            Ok(response) => {
                let confirmed = CommentLike {
                    is_liked: response.is_liked,
                    likes_count: response.likes_count,
                };
                if tracked.confirm(seq, confirmed) == Completion::Superseded {
                    debug!("Like response for comment {} superseded", comment_id);
                }
                Ok(*tracked.displayed())
            }
            Err(err) => {
                if tracked.fail(seq) == Completion::Applied {
                    warn!("Like on comment {} failed, rolled back: {}", comment_id, err);
                }
                Err(err.into())
            }
        }
    }

    pub fn content_id(&self) -> Option<ContentId> {
        self.state().content_id
    }

    /// The loaded thread with local like state applied.
    pub fn comments(&self) -> Vec<Comment> {
        self.state().view()
    }

    pub fn like(&self, comment_id: CommentId) -> Option<CommentLike> {
        self.state()
            .likes
            .get(&comment_id)
            .map(|tracked| *tracked.displayed())
    }

    /// Number of comments in the thread, replies included.
    pub fn len(&self) -> usize {
        let mut count = 0;
        visit(&self.state().thread, &mut |_| count += 1);
        count
    }

    pub fn is_empty(&self) -> bool {
        let state = self.state();
        state.thread.is_empty() && state.likes.is_empty()
    }

    pub fn clear(&self) {
        *self.state() = CommentState::default();
    }
}
