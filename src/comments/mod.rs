mod comment_store;

pub use comment_store::{CommentLike, CommentStore};
