//! # In-memory document store
//!
//! Each thread is one document holding its posts, so a post commit or
//! removal and the matching counter change happen under a single map
//! entry lock and are never observed apart.

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;
use domains::{
    AppError, BoardRepo, Category, LikeOutcome, Post, PostId, Result, Thread, ThreadId,
    ThreadQuery, UserId,
};
use tracing::debug;

#[derive(Debug, Clone)]
struct ThreadDoc {
    thread: Thread,
    /// Keyed by post number.
    posts: BTreeMap<u64, Post>,
}

#[derive(Debug, Default)]
pub struct InMemoryBoardRepo {
    threads: DashMap<ThreadId, ThreadDoc>,
    categories: DashMap<String, Category>,
}

impl InMemoryBoardRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers categories up front, e.g. the board's fixed sections.
    pub fn with_categories<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let repo = Self::new();
        for name in names {
            let category = Category::named(name);
            repo.categories.insert(category.name.clone(), category);
        }
        repo
    }

    /// Stores `thread` as-is, with no posts. Its category is counted.
    pub fn seed_thread(&self, thread: Thread) {
        self.bump_category(&thread.category, 1);
        self.threads.insert(
            thread.id,
            ThreadDoc {
                thread,
                posts: BTreeMap::new(),
            },
        );
    }

    /// Overwrites a thread's stored `post_count` without touching its posts.
    pub fn force_post_count(&self, id: ThreadId, count: u64) {
        if let Some(mut doc) = self.threads.get_mut(&id) {
            doc.thread.post_count = count;
        }
    }

    fn bump_category(&self, name: &str, delta: i64) {
        let mut category = self
            .categories
            .entry(name.to_owned())
            .or_insert_with(|| Category::named(name));
        category.thread_count = category.thread_count.saturating_add_signed(delta);
    }
}

#[async_trait]
impl BoardRepo for InMemoryBoardRepo {
    async fn list_categories(&self) -> Result<Vec<Category>> {
        let mut categories: Vec<Category> = self.categories.iter().map(|c| c.clone()).collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn get_category(&self, name: &str) -> Result<Option<Category>> {
        Ok(self.categories.get(name).map(|c| c.clone()))
    }

    async fn create_thread(&self, thread: Thread, first_post: Post) -> Result<()> {
        if first_post.thread_id != thread.id {
            return Err(AppError::Persistence(format!(
                "first post belongs to {}, not {}",
                first_post.thread_id, thread.id
            )));
        }
        let category = thread.category.clone();
        match self.threads.entry(thread.id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(AppError::Conflict(format!("thread {} already exists", thread.id)));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let mut posts = BTreeMap::new();
                posts.insert(first_post.number, first_post);
                slot.insert(ThreadDoc { thread, posts });
            }
        }
        self.bump_category(&category, 1);
        Ok(())
    }

    async fn get_thread(&self, id: ThreadId) -> Result<Option<Thread>> {
        Ok(self.threads.get(&id).map(|doc| doc.thread.clone()))
    }

    async fn list_threads(&self, query: &ThreadQuery) -> Result<Vec<Thread>> {
        let mut threads: Vec<Thread> = self
            .threads
            .iter()
            .filter(|doc| query.matches(&doc.thread))
            .map(|doc| doc.thread.clone())
            .collect();
        query.sort(&mut threads);
        Ok(threads)
    }

    async fn delete_thread(&self, id: ThreadId) -> Result<Option<Thread>> {
        let Some((_, doc)) = self.threads.remove(&id) else {
            return Ok(None);
        };
        self.bump_category(&doc.thread.category, -1);
        debug!(thread_id = %id, posts = doc.posts.len(), "thread document removed");
        Ok(Some(doc.thread))
    }

    async fn list_posts(&self, thread_id: ThreadId) -> Result<Vec<Post>> {
        Ok(self
            .threads
            .get(&thread_id)
            .map(|doc| doc.posts.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_post(&self, thread_id: ThreadId, post_id: PostId) -> Result<Option<Post>> {
        Ok(self.threads.get(&thread_id).and_then(|doc| {
            doc.posts.values().find(|p| p.id == post_id).cloned()
        }))
    }

    async fn commit_post(&self, post: Post) -> Result<Thread> {
        let mut doc = self
            .threads
            .get_mut(&post.thread_id)
            .ok_or(AppError::ThreadNotFound(post.thread_id))?;
        if post.number <= doc.thread.last_number || doc.posts.contains_key(&post.number) {
            return Err(AppError::Conflict(format!(
                "post number {} already used in thread {}",
                post.number, post.thread_id
            )));
        }
        doc.thread.post_count += 1;
        doc.thread.last_number = post.number;
        doc.thread.last_post_at = post.created_at;
        doc.posts.insert(post.number, post);
        Ok(doc.thread.clone())
    }

    async fn remove_post(&self, thread_id: ThreadId, post_id: PostId) -> Result<Option<Post>> {
        let Some(mut doc) = self.threads.get_mut(&thread_id) else {
            return Ok(None);
        };
        let Some(number) = doc
            .posts
            .values()
            .find(|p| p.id == post_id)
            .map(|p| p.number)
        else {
            return Ok(None);
        };
        let removed = doc.posts.remove(&number);
        doc.thread.post_count = doc.thread.post_count.saturating_sub(1);
        Ok(removed)
    }

    async fn recount_posts(&self, thread_id: ThreadId) -> Result<u64> {
        let mut doc = self
            .threads
            .get_mut(&thread_id)
            .ok_or(AppError::ThreadNotFound(thread_id))?;
        doc.thread.post_count = doc.posts.len() as u64;
        Ok(doc.thread.post_count)
    }

    async fn add_nickname(&self, thread_id: ThreadId, nickname: &str) -> Result<bool> {
        let mut doc = self
            .threads
            .get_mut(&thread_id)
            .ok_or(AppError::ThreadNotFound(thread_id))?;
        Ok(doc.thread.add_nickname(nickname))
    }

    async fn like_thread(&self, thread_id: ThreadId, user: &UserId) -> Result<LikeOutcome> {
        let mut doc = self
            .threads
            .get_mut(&thread_id)
            .ok_or(AppError::ThreadNotFound(thread_id))?;
        let liked = doc.thread.add_like(user);
        Ok(LikeOutcome {
            likes: doc.thread.likes,
            liked,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domains::DEFAULT_CATEGORY;

    fn post(thread_id: ThreadId, number: u64) -> Post {
        Post {
            id: PostId::new(),
            thread_id,
            number,
            content: format!("post {number}"),
            name: "名無しさん".into(),
            user_id: None,
            created_at: Utc::now(),
            image_url: None,
        }
    }

    async fn with_thread(category: &str) -> (InMemoryBoardRepo, Thread) {
        let repo = InMemoryBoardRepo::new();
        let mut thread = Thread::new("doc".into(), category.into(), Utc::now());
        thread.post_count = 1;
        thread.last_number = 1;
        repo.create_thread(thread.clone(), post(thread.id, 1)).await.unwrap();
        (repo, thread)
    }

    #[tokio::test]
    async fn create_counts_category_and_rejects_duplicates() {
        let (repo, thread) = with_thread("tech").await;
        assert_eq!(repo.get_category("tech").await.unwrap().unwrap().thread_count, 1);
        assert!(matches!(
            repo.create_thread(thread.clone(), post(thread.id, 1)).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(repo.get_category("tech").await.unwrap().unwrap().thread_count, 1);
    }

    #[tokio::test]
    async fn commit_moves_counters_with_the_post() {
        let (repo, thread) = with_thread(DEFAULT_CATEGORY).await;
        let second = post(thread.id, 2);
        let updated = repo.commit_post(second.clone()).await.unwrap();
        assert_eq!(updated.post_count, 2);
        assert_eq!(updated.last_number, 2);
        assert_eq!(updated.last_post_at, second.created_at);
        assert!(matches!(
            repo.commit_post(post(thread.id, 2)).await,
            Err(AppError::Conflict(_))
        ));
        let missing = ThreadId::new();
        assert_eq!(
            repo.commit_post(post(missing, 1)).await,
            Err(AppError::ThreadNotFound(missing))
        );
    }

    #[tokio::test]
    async fn remove_decrements_once() {
        let (repo, thread) = with_thread(DEFAULT_CATEGORY).await;
        let second = post(thread.id, 2);
        repo.commit_post(second.clone()).await.unwrap();
        assert!(repo.remove_post(thread.id, second.id).await.unwrap().is_some());
        assert!(repo.remove_post(thread.id, second.id).await.unwrap().is_none());
        let stored = repo.get_thread(thread.id).await.unwrap().unwrap();
        assert_eq!(stored.post_count, 1);
        assert_eq!(stored.last_number, 2);
    }

    #[tokio::test]
    async fn recount_repairs_drift() {
        let (repo, thread) = with_thread(DEFAULT_CATEGORY).await;
        repo.force_post_count(thread.id, 9);
        assert_eq!(repo.recount_posts(thread.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_thread_drops_posts_and_category_count() {
        let (repo, thread) = with_thread("news").await;
        assert!(repo.delete_thread(thread.id).await.unwrap().is_some());
        assert!(repo.list_posts(thread.id).await.unwrap().is_empty());
        assert_eq!(repo.get_category("news").await.unwrap().unwrap().thread_count, 0);
        assert!(repo.delete_thread(thread.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn likes_and_nicknames_require_the_thread() {
        let (repo, thread) = with_thread(DEFAULT_CATEGORY).await;
        let user = UserId("u".into());
        assert_eq!(
            repo.like_thread(thread.id, &user).await.unwrap(),
            LikeOutcome { likes: 1, liked: true }
        );
        assert!(repo.add_nickname(thread.id, "Fox_a1b2c").await.unwrap());
        assert!(!repo.add_nickname(thread.id, "Fox_a1b2c").await.unwrap());

        let missing = ThreadId::new();
        assert_eq!(
            repo.add_nickname(missing, "x").await,
            Err(AppError::ThreadNotFound(missing))
        );
    }

    #[test]
    fn preset_categories_start_empty() {
        let repo = InMemoryBoardRepo::with_categories(["news", "tech"]);
        let categories = tokio_test::block_on(repo.list_categories()).unwrap();
        assert_eq!(
            categories.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["news", "tech"]
        );
        assert!(categories.iter().all(|c| c.thread_count == 0));
    }
}
