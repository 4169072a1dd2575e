//! Per-source fixed-window request counter.
//!
//! A gate is an explicitly owned value: the binary builds one per concern
//! (global, post, auth) and hands out `Arc`s. Counters live only in memory
//! and a restart clears them.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use domains::{AppError, Clock, Result};
use tracing::{debug, warn};

/// Ceiling and window for one gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateRule {
    pub limit: u32,
    pub window_ms: u64,
}

impl RateRule {
    pub const fn new(limit: u32, window_ms: u64) -> Self {
        Self { limit, window_ms }
    }

    /// 100 requests per 15 minutes.
    pub const GLOBAL: RateRule = RateRule::new(100, 15 * 60 * 1000);
    /// 50 posts per 15 minutes.
    pub const POST: RateRule = RateRule::new(50, 15 * 60 * 1000);
    /// 10 failed credential checks per hour.
    pub const AUTH: RateRule = RateRule::new(10, 60 * 60 * 1000);
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    window_start: DateTime<Utc>,
    count: u32,
}

pub struct RateGate {
    name: &'static str,
    rule: RateRule,
    windows: DashMap<String, RateWindow>,
    clock: Arc<dyn Clock>,
}

impl RateGate {
    pub fn new(name: &'static str, rule: RateRule, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            rule,
            windows: DashMap::new(),
            clock,
        }
    }

    pub fn rule(&self) -> RateRule {
        self.rule
    }

    /// Counts one attempt from `source` and says whether it is within
    /// `limit` for the current window. A window older than `window_ms`
    /// starts over at a count of one.
    pub fn allow(&self, source: &str, limit: u32, window_ms: u64) -> bool {
        let now = self.clock.now();
        let window = Duration::milliseconds(window_ms as i64);
        let mut entry = self.windows.entry(source.to_owned()).or_insert(RateWindow {
            window_start: now,
            count: 0,
        });
        if entry.count == 0 || now - entry.window_start > window {
            *entry = RateWindow {
                window_start: now,
                count: 1,
            };
            return true;
        }
        entry.count = entry.count.saturating_add(1);
        entry.count <= limit
    }

    /// [`RateGate::allow`] against this gate's own rule, as a `Result`.
    pub fn admit(&self, source: &str) -> Result<()> {
        if self.allow(source, self.rule.limit, self.rule.window_ms) {
            return Ok(());
        }
        warn!(gate = self.name, source, "rate limit exceeded");
        Err(AppError::RateLimited(format!(
            "{} limit of {} per {} minutes reached, try again later",
            self.name,
            self.rule.limit,
            self.rule.window_ms / 60_000
        )))
    }

    /// `true` when `source` has already used up the current window.
    /// Does not count as an attempt.
    pub fn is_exhausted(&self, source: &str) -> bool {
        let now = self.clock.now();
        let window = Duration::milliseconds(self.rule.window_ms as i64);
        self.windows.get(source).is_some_and(|w| {
            now - w.window_start <= window && w.count >= self.rule.limit
        })
    }

    /// Drops windows that have fully elapsed.
    pub fn purge_expired(&self) {
        let now = self.clock.now();
        let window = Duration::milliseconds(self.rule.window_ms as i64);
        let before = self.windows.len();
        self.windows.retain(|_, w| now - w.window_start <= window);
        debug!(gate = self.name, removed = before - self.windows.len(), "purged rate windows");
    }

    pub fn tracked_sources(&self) -> usize {
        self.windows.len()
    }
}
