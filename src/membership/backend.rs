use async_trait::async_trait;
use std::sync::Arc;

use crate::api::{ApiResult, CategoryApi, WishlistApi};

/// The endpoints behind a set of ids the user can toggle membership in.
#[async_trait]
pub trait MembershipBackend: Send + Sync {
    /// Name used in logs.
    fn kind(&self) -> &'static str;

    async fn list(&self) -> ApiResult<Vec<u64>>;

    async fn add(&self, id: u64) -> ApiResult<()>;

    async fn remove(&self, id: u64) -> ApiResult<()>;
}

/// Content ids saved to the user's wishlist.
pub struct WishlistBackend(pub Arc<dyn WishlistApi>);

#[async_trait]
impl MembershipBackend for WishlistBackend {
    fn kind(&self) -> &'static str {
        "wishlist"
    }

    async fn list(&self) -> ApiResult<Vec<u64>> {
        let items = self.0.list_wishlist().await?;
        Ok(items.into_iter().map(|item| item.id).collect())
    }

    async fn add(&self, id: u64) -> ApiResult<()> {
        self.0.add_to_wishlist(id).await
    }

    async fn remove(&self, id: u64) -> ApiResult<()> {
        self.0.remove_from_wishlist(id).await
    }
}

/// Category ids the user is subscribed to.
pub struct SubscriptionBackend(pub Arc<dyn CategoryApi>);

#[async_trait]
impl MembershipBackend for SubscriptionBackend {
    fn kind(&self) -> &'static str {
        "subscriptions"
    }

    async fn list(&self) -> ApiResult<Vec<u64>> {
        let categories = self.0.list_subscriptions().await?;
        Ok(categories.into_iter().map(|category| category.id).collect())
    }

    async fn add(&self, id: u64) -> ApiResult<()> {
        self.0.subscribe(id).await
    }

    async fn remove(&self, id: u64) -> ApiResult<()> {
        self.0.unsubscribe(id).await
    }
}
