//! crates/services/src/lib.rs
//!
//! The posting, real-time and moderation core. Everything here talks to the
//! outside world only through the ports in `domains`.

pub mod authn;
pub mod broadcast;
pub mod content_validator;
pub mod image_ingest;
pub mod moderation;
pub mod nickname;
pub mod posting;
pub mod rate_gate;
pub mod sequencer;
pub mod threads;

use std::sync::Arc;

use domains::{AuthProvider, BoardRepo, Clock, MediaStore};

pub use authn::Authenticator;
pub use broadcast::{BroadcastHub, ConnectionId};
pub use content_validator::{ContentPolicy, ContentValidator, ValidationError};
pub use image_ingest::{ImageIngest, ImagePayload, ImagePolicy};
pub use moderation::ModerationGate;
pub use nickname::{ClaimState, NicknameDecision, NicknameRegistry, NicknameSession, RejectReason};
pub use posting::{PostingService, Submission};
pub use rate_gate::{RateGate, RateRule};
pub use sequencer::{PostDraft, PostSequencer};
pub use threads::{NewThread, NicknameCheck, ThreadService};

/// Tunables handed in by the binary. Services never read the environment.
#[derive(Debug, Clone, Default)]
pub struct BoardPolicy {
    pub content: ContentPolicy,
    pub images: ImagePolicy,
    pub rates: RatePolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub global: RateRule,
    pub post: RateRule,
    pub auth: RateRule,
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self {
            global: RateRule::GLOBAL,
            post: RateRule::POST,
            auth: RateRule::AUTH,
        }
    }
}

/// Every core component, wired once and shared by the transports.
#[derive(Clone)]
pub struct Services {
    pub global_gate: Arc<RateGate>,
    pub post_gate: Arc<RateGate>,
    pub auth_gate: Arc<RateGate>,
    pub validator: Arc<ContentValidator>,
    pub auth: Arc<Authenticator>,
    pub images: Arc<ImageIngest>,
    pub nicknames: Arc<NicknameRegistry>,
    pub hub: Arc<BroadcastHub>,
    pub posting: Arc<PostingService>,
    pub threads: Arc<ThreadService>,
    pub moderation: Arc<ModerationGate>,
}

impl Services {
    pub fn new(
        policy: BoardPolicy,
        repo: Arc<dyn BoardRepo>,
        media: Arc<dyn MediaStore>,
        identity: Arc<dyn AuthProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let global_gate = Arc::new(RateGate::new("global", policy.rates.global, clock.clone()));
        let post_gate = Arc::new(RateGate::new("post", policy.rates.post, clock.clone()));
        let auth_gate = Arc::new(RateGate::new("auth", policy.rates.auth, clock.clone()));

        let validator = Arc::new(ContentValidator::new(policy.content));
        let auth = Arc::new(Authenticator::new(identity, auth_gate.clone()));
        let images = Arc::new(ImageIngest::new(policy.images, media));
        let nicknames = Arc::new(NicknameRegistry::new(repo.clone(), validator.clone()));
        let sequencer = Arc::new(PostSequencer::new(repo.clone(), clock));
        let hub = Arc::new(BroadcastHub::new());

        let posting = Arc::new(PostingService::new(
            repo.clone(),
            post_gate.clone(),
            validator.clone(),
            auth.clone(),
            images.clone(),
            nicknames.clone(),
            sequencer.clone(),
            hub.clone(),
        ));
        let threads = Arc::new(ThreadService::new(
            repo.clone(),
            post_gate.clone(),
            validator.clone(),
            auth.clone(),
            images.clone(),
            nicknames.clone(),
            sequencer,
        ));
        let moderation = Arc::new(ModerationGate::new(repo, validator.clone(), hub.clone()));

        Self {
            global_gate,
            post_gate,
            auth_gate,
            validator,
            auth,
            images,
            nicknames,
            hub,
            posting,
            threads,
            moderation,
        }
    }

    /// Drops elapsed rate windows from every gate.
    pub fn purge_rate_windows(&self) {
        for gate in [&self.global_gate, &self.post_gate, &self.auth_gate] {
            gate.purge_expired();
        }
    }
}
