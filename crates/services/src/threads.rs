//! Thread, category and like operations around the posting pipeline.

use std::sync::Arc;

use domains::{
    AppError, BoardRepo, Category, Identity, LikeOutcome, Post, Result, Thread, ThreadId,
    ThreadQuery, DEFAULT_CATEGORY,
};
use tracing::{info, warn};

use crate::authn::Authenticator;
use crate::content_validator::{ContentValidator, ThreadInput};
use crate::image_ingest::{ImageIngest, ImagePayload};
use crate::nickname::{Availability, NicknameRegistry};
use crate::rate_gate::RateGate;
use crate::sequencer::{PostDraft, PostSequencer};

/// A new thread as submitted over HTTP.
#[derive(Debug, Clone, Copy)]
pub struct NewThread<'a> {
    pub source: &'a str,
    pub title: &'a str,
    pub category: Option<&'a str>,
    pub content: &'a str,
    pub name: Option<&'a str>,
    /// `data:` URI.
    pub image: Option<&'a str>,
    pub credential: Option<&'a str>,
}

/// Answer to "may I use this nickname here".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NicknameCheck {
    pub available: bool,
    pub message: Option<String>,
}

pub struct ThreadService {
    repo: Arc<dyn BoardRepo>,
    post_gate: Arc<RateGate>,
    validator: Arc<ContentValidator>,
    auth: Arc<Authenticator>,
    images: Arc<ImageIngest>,
    nicknames: Arc<NicknameRegistry>,
    sequencer: Arc<PostSequencer>,
}

impl ThreadService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<dyn BoardRepo>,
        post_gate: Arc<RateGate>,
        validator: Arc<ContentValidator>,
        auth: Arc<Authenticator>,
        images: Arc<ImageIngest>,
        nicknames: Arc<NicknameRegistry>,
        sequencer: Arc<PostSequencer>,
    ) -> Self {
        Self {
            repo,
            post_gate,
            validator,
            auth,
            images,
            nicknames,
            sequencer,
        }
    }

    /// Creates a thread and its first post as one unit. An image, if any,
    /// is shown on both.
    #[tracing::instrument(skip(self, input), fields(source = input.source))]
    pub async fn create_thread(&self, input: NewThread<'_>) -> Result<(Thread, Post)> {
        self.post_gate.admit(input.source)?;
        let clean = self.validator.validate(ThreadInput {
            title: input.title,
            category: input.category,
            content: input.content,
            name: input.name,
        })?;
        let identity = self.auth.authenticate(input.source, input.credential).await?;

        let image_url = match input.image {
            Some(uri) => Some(
                self.images
                    .ingest(ImagePayload::DataUri(uri), identity.is_some())
                    .await?,
            ),
            None => None,
        };

        let category = clean.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_owned());
        let mut thread = Thread::new(clean.title, category, chrono::Utc::now());
        thread.image_url = image_url.clone();
        thread.creator = identity.as_ref().map(|i| i.user_id.clone());

        let name = clean
            .post
            .name
            .unwrap_or_else(|| self.validator.default_name().to_owned());
        if name != self.validator.default_name() {
            thread.add_nickname(&name);
        }

        self.sequencer
            .create_thread(
                thread,
                PostDraft {
                    content: clean.post.content,
                    name,
                    user_id: identity.map(|i| i.user_id),
                    image_url,
                },
            )
            .await
    }

    pub async fn get_thread(&self, id: ThreadId) -> Result<Thread> {
        self.repo
            .get_thread(id)
            .await?
            .ok_or(AppError::ThreadNotFound(id))
    }

    pub async fn list_threads(&self, query: &ThreadQuery) -> Result<Vec<Thread>> {
        self.repo.list_threads(query).await
    }

    /// Posts in number order.
    pub async fn list_posts(&self, id: ThreadId) -> Result<Vec<Post>> {
        self.get_thread(id).await?;
        let mut posts = self.repo.list_posts(id).await?;
        posts.sort_by_key(|p| p.number);
        Ok(posts)
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        self.repo.list_categories().await
    }

    /// A category that has never held a thread still exists, empty.
    pub async fn get_category(&self, name: &str) -> Result<Category> {
        Ok(self
            .repo
            .get_category(name)
            .await?
            .unwrap_or_else(|| Category::named(name)))
    }

    pub async fn like(&self, id: ThreadId, identity: &Identity) -> Result<LikeOutcome> {
        let outcome = self.repo.like_thread(id, &identity.user_id).await?;
        info!(thread_id = %id, user = %identity.user_id, liked = outcome.liked, likes = outcome.likes, "thread liked");
        Ok(outcome)
    }

    pub async fn delete_thread(&self, id: ThreadId, actor: &Identity) -> Result<Thread> {
        let thread = self
            .repo
            .delete_thread(id)
            .await?
            .ok_or(AppError::ThreadNotFound(id))?;
        self.sequencer.forget(id);
        info!(thread_id = %id, actor = %actor.user_id, "thread deleted");
        Ok(thread)
    }

    pub async fn check_nickname(&self, id: ThreadId, nickname: &str) -> Result<NicknameCheck> {
        Ok(match self.nicknames.availability(id, nickname).await? {
            Availability::Available => NicknameCheck {
                available: true,
                message: None,
            },
            Availability::Unavailable(reason) => NicknameCheck {
                available: false,
                message: Some(reason.to_string()),
            },
        })
    }

    /// Rewrites `postCount` from the stored posts. Returns the corrected count.
    pub async fn reconcile_post_count(&self, id: ThreadId) -> Result<u64> {
        let before = self.get_thread(id).await?.post_count;
        let actual = self.repo.recount_posts(id).await?;
        if before != actual {
            warn!(thread_id = %id, before, actual, "post count drift repaired");
        }
        Ok(actual)
    }
}
