//! Per-thread post numbering.
//!
//! Numbers are assigned under a per-thread async mutex and committed in one
//! storage step together with the thread's counters, so two submissions to
//! the same thread never share a number. Different threads never contend.

use std::sync::Arc;

use dashmap::DashMap;
use domains::{AppError, BoardRepo, Clock, Post, PostId, Result, Thread, ThreadId, UserId};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Another process may have committed the same number; re-read and retry
/// this many times before giving up.
const MAX_COMMIT_ATTEMPTS: usize = 3;

/// Everything a post needs except its number and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    pub content: String,
    pub name: String,
    pub user_id: Option<UserId>,
    pub image_url: Option<String>,
}

pub struct PostSequencer {
    repo: Arc<dyn BoardRepo>,
    clock: Arc<dyn Clock>,
    locks: DashMap<ThreadId, Arc<Mutex<()>>>,
}

impl PostSequencer {
    pub fn new(repo: Arc<dyn BoardRepo>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            clock,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, thread_id: ThreadId) -> Arc<Mutex<()>> {
        self.locks.entry(thread_id).or_default().clone()
    }

    /// Appends `draft` as the next post of `thread_id`. Returns the stored
    /// post and the thread as updated by the same commit.
    #[tracing::instrument(level = "debug", skip(self, draft))]
    pub async fn append_post(&self, thread_id: ThreadId, draft: PostDraft) -> Result<(Post, Thread)> {
        let lock = self.lock_for(thread_id);
        let _guard = lock.lock().await;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let thread = self
                .repo
                .get_thread(thread_id)
                .await?
                .ok_or(AppError::ThreadNotFound(thread_id))?;
            let post = Post {
                id: PostId::new(),
                thread_id,
                number: thread.last_number + 1,
                content: draft.content.clone(),
                name: draft.name.clone(),
                user_id: draft.user_id.clone(),
                created_at: self.clock.now(),
                image_url: draft.image_url.clone(),
            };
            match self.repo.commit_post(post.clone()).await {
                Ok(updated) => {
                    info!(%thread_id, post_id = %post.id, number = post.number, "post committed");
                    return Ok((post, updated));
                }
                Err(AppError::Conflict(reason)) if attempt < MAX_COMMIT_ATTEMPTS => {
                    warn!(%thread_id, number = post.number, attempt, %reason, "post number taken, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Stores a new thread together with post #1.
    #[tracing::instrument(level = "debug", skip(self, thread, draft), fields(thread_id = %thread.id))]
    pub async fn create_thread(&self, mut thread: Thread, draft: PostDraft) -> Result<(Thread, Post)> {
        let now = self.clock.now();
        let post = Post {
            id: PostId::new(),
            thread_id: thread.id,
            number: 1,
            content: draft.content,
            name: draft.name,
            user_id: draft.user_id,
            created_at: now,
            image_url: draft.image_url,
        };
        thread.created_at = now;
        thread.last_post_at = now;
        thread.post_count = 1;
        thread.last_number = 1;
        self.repo.create_thread(thread.clone(), post.clone()).await?;
        info!(thread_id = %thread.id, category = %thread.category, "thread created");
        Ok((thread, post))
    }

    /// Drops the lock of a deleted thread.
    pub fn forget(&self, thread_id: ThreadId) {
        self.locks.remove(&thread_id);
    }
}
