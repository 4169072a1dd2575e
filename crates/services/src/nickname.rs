//! Per-thread anonymous nicknames.
//!
//! Generation is best-effort unique: an adjective, a noun and a five
//! character suffix, with no allocation lock. Negotiation never retries on
//! the server; a rejected first attempt tells the caller to try a freshly
//! generated name instead.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use domains::{AppError, BoardRepo, Result, ThreadId};
use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::{debug, info};

use crate::content_validator::{ContentValidator, NicknameInput};

const ADJECTIVES: &[&str] = &[
    "Swift", "Quiet", "Brave", "Lucky", "Sleepy", "Clever", "Gentle", "Wild", "Silent", "Bright",
    "Hidden", "Crimson", "Frosty", "Misty", "Nimble", "Rusty", "Sunny", "Velvet", "Wandering",
    "Shy",
];

const NOUNS: &[&str] = &[
    "Fox", "Crane", "Tanuki", "Ninja", "Otter", "Falcon", "Koi", "Badger", "Cat", "Heron",
    "Lantern", "Maple", "Owl", "Panda", "Ronin", "Sparrow", "Tiger", "Wolf", "Sakura", "Ferret",
];

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 5;

/// `{Adjective}{Noun}_{suffix}`, e.g. `SwiftFox_a1b2c`.
pub fn generate_nickname<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("Nameless");
    let noun = NOUNS.choose(rng).copied().unwrap_or("Poster");
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect();
    format!("{adjective}{noun}_{suffix}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Someone already claimed it in this thread.
    Taken,
    /// The anonymous default name cannot be claimed.
    Reserved,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Taken => f.write_str("this nickname is already used in the thread"),
            RejectReason::Reserved => f.write_str("this nickname is reserved"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NicknameDecision {
    Accepted(String),
    Rejected {
        reason: RejectReason,
        /// Set on a first attempt: retry with a generated candidate rather
        /// than asking the user.
        regenerate: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable(RejectReason),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

pub struct NicknameRegistry {
    repo: Arc<dyn BoardRepo>,
    validator: Arc<ContentValidator>,
}

impl NicknameRegistry {
    pub fn new(repo: Arc<dyn BoardRepo>, validator: Arc<ContentValidator>) -> Self {
        Self { repo, validator }
    }

    pub fn assign_generated(&self, thread_id: ThreadId) -> String {
        let nickname = generate_nickname(&mut rand::rng());
        debug!(%thread_id, %nickname, "generated nickname");
        nickname
    }

    /// Read-only check against the thread's recorded nickname set.
    pub async fn availability(&self, thread_id: ThreadId, candidate: &str) -> Result<Availability> {
        let candidate = self.validator.validate(NicknameInput(candidate))?;
        if candidate == self.validator.default_name() {
            return Ok(Availability::Unavailable(RejectReason::Reserved));
        }
        let thread = self
            .repo
            .get_thread(thread_id)
            .await?
            .ok_or(AppError::ThreadNotFound(thread_id))?;
        if thread.has_nickname(&candidate) {
            return Ok(Availability::Unavailable(RejectReason::Taken));
        }
        Ok(Availability::Available)
    }

    /// Accepts and records `candidate` if nobody holds it in this thread.
    pub async fn negotiate(
        &self,
        thread_id: ThreadId,
        candidate: &str,
        is_first_attempt: bool,
    ) -> Result<NicknameDecision> {
        match self.availability(thread_id, candidate).await? {
            Availability::Available => {
                let nickname = candidate.trim().to_owned();
                self.claim(thread_id, &nickname).await?;
                Ok(NicknameDecision::Accepted(nickname))
            }
            Availability::Unavailable(reason) => {
                debug!(%thread_id, %reason, is_first_attempt, "nickname rejected");
                Ok(NicknameDecision::Rejected {
                    reason,
                    regenerate: is_first_attempt,
                })
            }
        }
    }

    /// Idempotent add to the thread's nickname set.
    pub async fn claim(&self, thread_id: ThreadId, nickname: &str) -> Result<()> {
        if self.repo.add_nickname(thread_id, nickname).await? {
            info!(%thread_id, nickname, "nickname claimed");
        }
        Ok(())
    }
}

/// Where one anonymous participant stands in one thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ClaimState {
    #[default]
    Unclaimed,
    PendingConfirmation {
        candidate: String,
    },
    Bound {
        nickname: String,
    },
}

/// Session-scoped claim states, one per thread the session touched.
#[derive(Debug, Default)]
pub struct NicknameSession {
    claims: HashMap<ThreadId, ClaimState>,
}

impl NicknameSession {
    pub fn state(&self, thread_id: ThreadId) -> &ClaimState {
        static UNCLAIMED: ClaimState = ClaimState::Unclaimed;
        self.claims.get(&thread_id).unwrap_or(&UNCLAIMED)
    }

    pub fn bound(&self, thread_id: ThreadId) -> Option<&str> {
        match self.claims.get(&thread_id) {
            Some(ClaimState::Bound { nickname }) => Some(nickname),
            _ => None,
        }
    }

    /// `Unclaimed | PendingConfirmation -> PendingConfirmation`. A bound
    /// session keeps its name.
    pub fn propose(&mut self, thread_id: ThreadId, candidate: String) -> bool {
        let state = self.claims.entry(thread_id).or_default();
        if matches!(state, ClaimState::Bound { .. }) {
            return false;
        }
        *state = ClaimState::PendingConfirmation { candidate };
        true
    }

    /// Applies a negotiation outcome. Rejections leave the session pending
    /// so the caller can re-prompt.
    pub fn apply(&mut self, thread_id: ThreadId, candidate: &str, decision: &NicknameDecision) {
        let state = self.claims.entry(thread_id).or_default();
        *state = match decision {
            NicknameDecision::Accepted(nickname) => ClaimState::Bound {
                nickname: nickname.clone(),
            },
            NicknameDecision::Rejected { .. } => ClaimState::PendingConfirmation {
                candidate: candidate.to_owned(),
            },
        };
    }

    /// Binds directly, for names the client already holds or just posted with.
    pub fn bind(&mut self, thread_id: ThreadId, nickname: String) {
        self.claims.insert(thread_id, ClaimState::Bound { nickname });
    }
}
