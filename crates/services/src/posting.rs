//! The post submission pipeline shared by the real-time and HTTP paths.
//!
//! Order: post rate gate, structural validation, credential, thread lookup,
//! nickname ownership, image upload, numbering commit, broadcast. The image is uploaded before
//! the post is committed, so a failure after upload can only orphan a stored
//! object, never leave a post pointing at a missing image.

use std::sync::Arc;

use domains::{AppError, BoardRepo, Identity, Post, Result, ServerEvent, Thread, ThreadId};
use tracing::{info, warn};

use crate::authn::Authenticator;
use crate::broadcast::{BroadcastHub, ConnectionId};
use crate::content_validator::{ContentValidator, PostInput};
use crate::image_ingest::{ImageIngest, ImagePayload};
use crate::nickname::{NicknameRegistry, RejectReason};
use crate::rate_gate::RateGate;
use crate::sequencer::{PostDraft, PostSequencer};

/// One inbound post, from either transport.
#[derive(Debug, Clone)]
pub struct Submission<'a> {
    /// Rate-limit key of the caller.
    pub source: &'a str,
    pub thread_id: ThreadId,
    pub content: &'a str,
    pub name: Option<&'a str>,
    pub image: Option<ImagePayload<'a>>,
    pub credential: Option<&'a str>,
    /// Nickname the caller's session already holds for this thread.
    pub bound_nickname: Option<&'a str>,
}

impl<'a> Submission<'a> {
    pub fn new(source: &'a str, thread_id: ThreadId, content: &'a str) -> Self {
        Self {
            source,
            thread_id,
            content,
            name: None,
            image: None,
            credential: None,
            bound_nickname: None,
        }
    }
}

pub struct PostingService {
    repo: Arc<dyn BoardRepo>,
    post_gate: Arc<RateGate>,
    validator: Arc<ContentValidator>,
    auth: Arc<Authenticator>,
    images: Arc<ImageIngest>,
    nicknames: Arc<NicknameRegistry>,
    sequencer: Arc<PostSequencer>,
    hub: Arc<BroadcastHub>,
}

impl PostingService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<dyn BoardRepo>,
        post_gate: Arc<RateGate>,
        validator: Arc<ContentValidator>,
        auth: Arc<Authenticator>,
        images: Arc<ImageIngest>,
        nicknames: Arc<NicknameRegistry>,
        sequencer: Arc<PostSequencer>,
        hub: Arc<BroadcastHub>,
    ) -> Self {
        Self {
            repo,
            post_gate,
            validator,
            auth,
            images,
            nicknames,
            sequencer,
            hub,
        }
    }

    /// Runs the whole pipeline and broadcasts the accepted post to the
    /// thread's subscribers.
    #[tracing::instrument(
        skip(self, submission),
        fields(thread_id = %submission.thread_id, source = submission.source)
    )]
    pub async fn submit(&self, submission: Submission<'_>) -> Result<Post> {
        let Submission {
            source,
            thread_id,
            content,
            name,
            image,
            credential,
            bound_nickname,
        } = submission;

        self.post_gate.admit(source)?;
        let clean = self.validator.validate(PostInput { content, name })?;
        let identity = self.auth.authenticate(source, credential).await?;

        let thread = self
            .repo
            .get_thread(thread_id)
            .await?
            .ok_or(AppError::ThreadNotFound(thread_id))?;
        if let Some(requested) = clean.name.as_deref() {
            if Some(requested) != bound_nickname {
                self.ensure_name_free(&thread, requested, identity.as_ref()).await?;
            }
        }

        let image_url = match image {
            Some(payload) => Some(self.images.ingest(payload, identity.is_some()).await?),
            None => None,
        };

        let name = clean
            .name
            .or_else(|| bound_nickname.map(str::to_owned))
            .unwrap_or_else(|| self.validator.default_name().to_owned());

        let (post, thread) = self
            .sequencer
            .append_post(
                thread_id,
                PostDraft {
                    content: clean.content,
                    name,
                    user_id: identity.map(|i| i.user_id),
                    image_url,
                },
            )
            .await?;

        if post.name != self.validator.default_name() {
            if let Err(err) = self.nicknames.claim(thread_id, &post.name).await {
                warn!(%thread_id, %err, "nickname not recorded");
            }
        }

        let delivered = self.hub.publish(thread_id, ServerEvent::NewPost { post: post.clone() });
        info!(
            post_id = %post.id,
            number = post.number,
            post_count = thread.post_count,
            delivered,
            "post accepted"
        );
        Ok(post)
    }

    /// A name another participant claimed in this thread is refused, unless
    /// the authenticated caller has already posted under it here.
    async fn ensure_name_free(&self, thread: &Thread, name: &str, identity: Option<&Identity>) -> Result<()> {
        if name == self.validator.default_name() || !thread.has_nickname(name) {
            return Ok(());
        }
        if let Some(identity) = identity {
            let own = self
                .repo
                .list_posts(thread.id)
                .await?
                .iter()
                .any(|p| p.name == name && p.user_id.as_ref() == Some(&identity.user_id));
            if own {
                return Ok(());
            }
        }
        Err(AppError::NicknameUnavailable(RejectReason::Taken.to_string()))
    }

    /// [`PostingService::submit`] for a real-time connection: any failure is
    /// also reported to `connection` alone as `postError`.
    pub async fn submit_from(&self, connection: ConnectionId, submission: Submission<'_>) -> Result<Post> {
        let result = self.submit(submission).await;
        if let Err(err) = &result {
            warn!(%connection, kind = err.kind(), %err, "post rejected");
            self.hub.report_error(connection, err.to_string());
        }
        result
    }
}
