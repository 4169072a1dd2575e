//! Bearer-credential checks with failed-attempt damping.

use std::sync::Arc;

use domains::{AppError, AuthProvider, Identity, Result};
use tracing::warn;

use crate::rate_gate::RateGate;

pub struct Authenticator {
    provider: Arc<dyn AuthProvider>,
    gate: Arc<RateGate>,
}

impl Authenticator {
    pub fn new(provider: Arc<dyn AuthProvider>, gate: Arc<RateGate>) -> Self {
        Self { provider, gate }
    }

    /// `Ok(None)` for anonymous callers. A credential that is present but
    /// rejected is an error, and counts against `source`'s auth window.
    pub async fn authenticate(&self, source: &str, credential: Option<&str>) -> Result<Option<Identity>> {
        let Some(token) = credential.map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(None);
        };
        if self.gate.is_exhausted(source) {
            warn!(source, "credential check refused, too many failures");
            return Err(AppError::RateLimited(
                "too many failed sign-in attempts, try again later".into(),
            ));
        }
        match self.provider.verify_credential(token).await {
            Ok(identity) => Ok(Some(identity)),
            Err(err) => {
                let rule = self.gate.rule();
                self.gate.allow(source, rule.limit, rule.window_ms);
                warn!(source, %err, "credential rejected");
                Err(match err {
                    AppError::Unauthorized(msg) => AppError::Unauthorized(msg),
                    other => AppError::Unauthorized(other.to_string()),
                })
            }
        }
    }

    /// Like [`Authenticator::authenticate`] but anonymous callers are refused.
    pub async fn require(&self, source: &str, credential: Option<&str>) -> Result<Identity> {
        self.authenticate(source, credential)
            .await?
            .ok_or_else(|| AppError::Unauthorized("a bearer token is required".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_gate::RateRule;
    use chrono::Utc;
    use domains::{ManualClock, MockAuthProvider, UserId};

    fn authenticator(provider: MockAuthProvider, limit: u32) -> Authenticator {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let gate = Arc::new(RateGate::new("auth", RateRule::new(limit, 3_600_000), clock));
        Authenticator::new(Arc::new(provider), gate)
    }

    #[tokio::test]
    async fn anonymous_callers_pass_through_without_verification() {
        let mut provider = MockAuthProvider::new();
        provider.expect_verify_credential().never();
        let auth = authenticator(provider, 10);
        assert_eq!(auth.authenticate("1.1.1.1", None).await, Ok(None));
        assert_eq!(auth.authenticate("1.1.1.1", Some("  ")).await, Ok(None));
        assert!(matches!(
            auth.require("1.1.1.1", None).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn valid_token_yields_identity() {
        let mut provider = MockAuthProvider::new();
        provider
            .expect_verify_credential()
            .withf(|token| token == "good")
            .returning(|_| {
                Ok(Identity {
                    user_id: UserId("u1".into()),
                })
            });
        let auth = authenticator(provider, 10);
        let identity = auth.require("1.1.1.1", Some("good")).await.unwrap();
        assert_eq!(identity.user_id, UserId("u1".into()));
    }

    #[tokio::test]
    async fn repeated_failures_lock_the_source_out() {
        let mut provider = MockAuthProvider::new();
        provider
            .expect_verify_credential()
            .times(2)
            .returning(|_| Err(AppError::Unauthorized("bad signature".into())));
        let auth = authenticator(provider, 2);
        for _ in 0..2 {
            assert!(matches!(
                auth.authenticate("9.9.9.9", Some("bad")).await,
                Err(AppError::Unauthorized(_))
            ));
        }
        assert!(matches!(
            auth.authenticate("9.9.9.9", Some("bad")).await,
            Err(AppError::RateLimited(_))
        ));
    }
}
