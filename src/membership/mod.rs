//! Wishlist and category subscriptions: sets of ids the user toggles.

mod backend;
mod membership_store;

pub use backend::{MembershipBackend, SubscriptionBackend, WishlistBackend};
pub use membership_store::{MembershipStore, SubscriptionStore, WishlistStore};
