//! Shared constants for end-to-end tests
//!
//! When the seeded data in `fixtures.rs` changes, update only this file.

// ============================================================================
// Test User Credentials
// ============================================================================

pub const TEST_USER_ID: u64 = 1;
pub const TEST_USER: &str = "testuser";
pub const TEST_EMAIL: &str = "test@techhub.dev";
pub const TEST_PASS: &str = "testpass123";

pub const WRITER_USER_ID: u64 = 2;
pub const WRITER_USER: &str = "writer";
pub const WRITER_EMAIL: &str = "writer@techhub.dev";
pub const WRITER_PASS: &str = "writerpass123";

/// Account that exists but has been deactivated by an admin
pub const DEACTIVATED_USER_ID: u64 = 3;
pub const DEACTIVATED_EMAIL: &str = "gone@techhub.dev";
pub const DEACTIVATED_PASS: &str = "gonepass123";

pub const ADMIN_USER_ID: u64 = 4;
pub const ADMIN_EMAIL: &str = "admin@techhub.dev";
pub const ADMIN_PASS: &str = "adminpass123";

pub const USER_COUNT: usize = 4;

// ============================================================================
// Seeded Content
// ============================================================================

/// "Async Rust in practice", 10 likes and 2 dislikes, no reaction from the test user
pub const CONTENT_ASYNC_ID: u64 = 42;
pub const CONTENT_ASYNC_LIKES: u64 = 10;
pub const CONTENT_ASYNC_DISLIKES: u64 = 2;

/// "Ownership explained", liked by the test user, on their wishlist
pub const CONTENT_OWNERSHIP_ID: u64 = 43;

/// "Deploying with Docker", in the DevOps category, flagged as spam
pub const CONTENT_DOCKER_ID: u64 = 44;

/// Draft by the writer, never listed in the feed
pub const CONTENT_DRAFT_ID: u64 = 45;

/// Submitted by the writer, waiting in the publish queue
pub const CONTENT_REVIEW_ID: u64 = 46;

/// Number of published items
pub const PUBLISHED_COUNT: u64 = 3;

pub const MISSING_CONTENT_ID: u64 = 9999;

// ============================================================================
// Seeded Categories
// ============================================================================

/// The test user is subscribed to this one
pub const CATEGORY_RUST_ID: u64 = 1;
pub const CATEGORY_WEB_ID: u64 = 2;
pub const CATEGORY_DEVOPS_ID: u64 = 3;

// ============================================================================
// Seeded Notifications (all for the test user)
// ============================================================================

pub const NOTIFICATION_REPLY_ID: u64 = 1;
pub const NOTIFICATION_LIKE_ID: u64 = 2;
/// Already read
pub const NOTIFICATION_SYSTEM_ID: u64 = 3;
pub const SEEDED_UNREAD: u64 = 2;

// ============================================================================
// Seeded Comments (on CONTENT_ASYNC_ID)
// ============================================================================

/// Top-level comment by the writer, 3 likes
pub const COMMENT_WRITER_ID: u64 = 1;
pub const COMMENT_WRITER_LIKES: u64 = 3;

/// Reply by the test user to COMMENT_WRITER_ID
pub const COMMENT_REPLY_ID: u64 = 2;

// ============================================================================
// Seeded Flags
// ============================================================================

/// Open spam report on CONTENT_DOCKER_ID
pub const FLAG_OPEN_ID: u64 = 1;
/// Already resolved report on CONTENT_ASYNC_ID
pub const FLAG_RESOLVED_ID: u64 = 2;

// ============================================================================
// Timeouts
// ============================================================================

pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 10;
