//! # Core Traits (Ports)
//!
//! Any adapter must implement these traits to be wired into the binary.
//! The core only ever talks to persistence, object storage and identity
//! through them.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use mime::Mime;

use crate::error::Result;
use crate::models::{
    Category, Identity, LikeOutcome, Post, PostId, Thread, ThreadId, ThreadQuery, UserId,
};

/// Document store for categories, threads and posts.
///
/// Every method is a single logical unit: implementations must not leave a
/// half-applied change visible when they return an error.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BoardRepo: Send + Sync {
    // Category Operations
    async fn list_categories(&self) -> Result<Vec<Category>>;
    async fn get_category(&self, name: &str) -> Result<Option<Category>>;

    // Thread Operations

    /// Stores `thread` together with its first post and bumps (creating if
    /// needed) the category's thread count. All or nothing.
    async fn create_thread(&self, thread: Thread, first_post: Post) -> Result<()>;
    async fn get_thread(&self, id: ThreadId) -> Result<Option<Thread>>;
    async fn list_threads(&self, query: &ThreadQuery) -> Result<Vec<Thread>>;
    /// Removes the thread and its posts and decrements the category count.
    async fn delete_thread(&self, id: ThreadId) -> Result<Option<Thread>>;

    // Post Operations
    async fn list_posts(&self, thread_id: ThreadId) -> Result<Vec<Post>>;
    async fn get_post(&self, thread_id: ThreadId, post_id: PostId) -> Result<Option<Post>>;

    /// Inserts a numbered post and, in the same step, increments the thread's
    /// `post_count`, raises `last_number` and sets `last_post_at` to the post's
    /// creation time. Fails with `Conflict` if the number is already taken and
    /// with `ThreadNotFound` if the thread is gone. Returns the updated thread.
    async fn commit_post(&self, post: Post) -> Result<Thread>;

    /// Deletes a post and decrements the thread's `post_count` in one step.
    async fn remove_post(&self, thread_id: ThreadId, post_id: PostId) -> Result<Option<Post>>;

    /// Rewrites `post_count` from the actual number of stored posts.
    async fn recount_posts(&self, thread_id: ThreadId) -> Result<u64>;

    // Thread Attributes

    /// Idempotent add to the thread's nickname set. `true` if newly added.
    async fn add_nickname(&self, thread_id: ThreadId, nickname: &str) -> Result<bool>;
    async fn like_thread(&self, thread_id: ThreadId, user: &UserId) -> Result<LikeOutcome>;
}

/// Object storage for image uploads.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Saves raw bytes and returns a stable, publicly fetchable URL.
    async fn save_upload(&self, data: Bytes, content_type: &Mime) -> Result<String>;
}

/// Identity contract: decides whether a bearer credential is valid and whose.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn verify_credential(&self, token: &str) -> Result<Identity>;
}

/// Time source, injected so windows and timestamps can be driven by tests.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
