//! Report-triggered and explicit post removal.
//!
//! A report only removes a post when its justification text contains a
//! configured NG word. A report without one is refused and the post stays.

use std::sync::Arc;

use domains::{AppError, BoardRepo, Identity, Post, PostId, Result, ServerEvent, ThreadId};
use tracing::{info, warn};

use crate::broadcast::BroadcastHub;
use crate::content_validator::{ContentValidator, ReportInput};

pub struct ModerationGate {
    repo: Arc<dyn BoardRepo>,
    validator: Arc<ContentValidator>,
    hub: Arc<BroadcastHub>,
}

impl ModerationGate {
    pub fn new(repo: Arc<dyn BoardRepo>, validator: Arc<ContentValidator>, hub: Arc<BroadcastHub>) -> Self {
        Self { repo, validator, hub }
    }

    /// Removes the post if `content` names an NG word.
    #[tracing::instrument(level = "debug", skip(self, content))]
    pub async fn report(&self, thread_id: ThreadId, post_id: PostId, content: Option<&str>) -> Result<Post> {
        let content = self.validator.validate(ReportInput { content })?;
        let Some(word) = self.validator.find_ng_word(content) else {
            warn!(%thread_id, %post_id, "report refused, no NG word");
            return Err(AppError::NoNgWordMatch);
        };
        let removed = self.remove(thread_id, post_id).await?;
        info!(%thread_id, %post_id, ng_word = word, "post removed on report");
        Ok(removed)
    }

    /// Unconditional removal by an authenticated moderator.
    pub async fn delete_post(&self, thread_id: ThreadId, post_id: PostId, actor: &Identity) -> Result<Post> {
        let removed = self.remove(thread_id, post_id).await?;
        info!(%thread_id, %post_id, actor = %actor.user_id, "post deleted");
        Ok(removed)
    }

    async fn remove(&self, thread_id: ThreadId, post_id: PostId) -> Result<Post> {
        let removed = self
            .repo
            .remove_post(thread_id, post_id)
            .await?
            .ok_or(AppError::PostNotFound(post_id))?;
        self.hub
            .publish(thread_id, ServerEvent::PostDeleted { thread_id, post_id });
        Ok(removed)
    }
}
