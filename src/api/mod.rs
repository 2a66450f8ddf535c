//! Client side of the TechHub REST API.

mod api_traits;
pub mod error;
mod http_client;
pub mod models;

#[cfg(any(test, feature = "mock"))]
pub use api_traits::{
    MockAdminApi, MockAuthApi, MockAuthoringApi, MockCategoryApi, MockCommentApi,
    MockContentApi, MockModerationApi, MockNotificationApi, MockWishlistApi,
};
pub use api_traits::{
    AdminApi, ApiResult, AuthApi, AuthoringApi, CategoryApi, CommentApi, ContentApi,
    ModerationApi, NotificationApi, TechHubApi, WishlistApi,
};
pub use error::{extract_error_message, ApiError};
pub use http_client::HttpApiClient;
pub use models::*;
