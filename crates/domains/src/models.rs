//! # Domain Models
//!
//! These structs represent the core entities of the board.
//! Thread and post ids are UUID v7 so they sort by creation time.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category a thread is filed under when the creator names none.
pub const DEFAULT_CATEGORY: &str = "general";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub Uuid);

impl ThreadId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub Uuid);

impl PostId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for PostId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Account id as issued by the identity provider. Opaque to the board.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A topic container holding an ordered sequence of posts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: ThreadId,
    pub title: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
    /// Bumped on every accepted post; drives "most recently active" ordering.
    pub last_post_at: DateTime<Utc>,
    /// Live posts in the thread. Moved together with the post collection.
    pub post_count: u64,
    /// Highest number ever handed out in this thread. Never decreases, so a
    /// deleted post's number is not reused.
    #[serde(default)]
    pub last_number: u64,
    pub likes: u64,
    #[serde(default)]
    pub likes_by: Vec<UserId>,
    /// Nicknames ever claimed in this thread, in claim order, no duplicates.
    #[serde(default)]
    pub user_nicknames: Vec<String>,
    pub image_url: Option<String>,
    pub creator: Option<UserId>,
}

impl Thread {
    /// A fresh thread with no posts committed yet.
    pub fn new(title: String, category: String, at: DateTime<Utc>) -> Self {
        Self {
            id: ThreadId::new(),
            title,
            category,
            created_at: at,
            last_post_at: at,
            post_count: 0,
            last_number: 0,
            likes: 0,
            likes_by: Vec::new(),
            user_nicknames: Vec::new(),
            image_url: None,
            creator: None,
        }
    }

    pub fn has_nickname(&self, nickname: &str) -> bool {
        self.user_nicknames.iter().any(|n| n == nickname)
    }

    /// Set-semantics insert. Returns `true` when the nickname was new.
    pub fn add_nickname(&mut self, nickname: &str) -> bool {
        if self.has_nickname(nickname) {
            return false;
        }
        self.user_nicknames.push(nickname.to_owned());
        true
    }

    /// Records a like from `user`. Returns `false` when they already liked it.
    pub fn add_like(&mut self, user: &UserId) -> bool {
        if self.likes_by.contains(user) {
            return false;
        }
        self.likes_by.push(user.clone());
        self.likes += 1;
        true
    }
}

/// A single numbered contribution within a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub thread_id: ThreadId,
    /// 1-based, unique within the thread.
    pub number: u64,
    pub content: String,
    pub name: String,
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub name: String,
    pub description: Option<String>,
    pub thread_count: u64,
}

impl Category {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            thread_count: 0,
        }
    }
}

/// Who an accepted credential belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadSort {
    /// Most recently active first.
    #[default]
    Active,
    Newest,
    Oldest,
}

/// Listing filter understood by [`crate::ports::BoardRepo::list_threads`].
#[derive(Debug, Clone, Default)]
pub struct ThreadQuery {
    pub category: Option<String>,
    /// Case-insensitive substring of the title.
    pub search: Option<String>,
    pub sort: ThreadSort,
}

impl ThreadQuery {
    pub fn matches(&self, thread: &Thread) -> bool {
        if let Some(category) = &self.category {
            if &thread.category != category {
                return false;
            }
        }
        match &self.search {
            Some(needle) => thread
                .title
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            None => true,
        }
    }

    pub fn sort(&self, threads: &mut [Thread]) {
        match self.sort {
            ThreadSort::Active => threads.sort_by(|a, b| {
                b.last_post_at.cmp(&a.last_post_at).then_with(|| b.id.cmp(&a.id))
            }),
            ThreadSort::Newest => {
                threads.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)))
            }
            ThreadSort::Oldest => {
                threads.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LikeOutcome {
    pub likes: u64,
    /// `false` when the user had already liked the thread.
    pub liked: bool,
}
