use std::time::{Duration, Instant};

use chatline_common::{ActorId, Error, Result};
use dashmap::DashMap;
use tracing::{debug, warn};

/// Per-actor admission control.
///
/// Implementations raise [`Error::RateLimited`] instead of returning a flag
/// so callers can treat a rejection like any other downstream failure.
pub trait AdmissionControl: Send + Sync {
    fn check_and_consume(&self, actor: &ActorId) -> Result<()>;
}

/// Window state for one actor. Lives only in this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_at: Instant,
}

/// Fixed-window counter per actor, backed by a concurrent map.
///
/// Expired entries are swept on every call, so memory stays bounded by the
/// number of actors active within one window. State is not shared across
/// processes: a multi-instance deployment only gets best-effort limiting.
pub struct RateLimiter {
    entries: DashMap<ActorId, RateLimitEntry>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_requests: max_requests.max(1),
            window,
        }
    }

    /// Admit or reject a call made at `now`.
    pub fn check_and_consume_at(&self, actor: &ActorId, now: Instant) -> Result<()> {
        self.sweep(now);

        let mut entry = self
            .entries
            .entry(actor.clone())
            .or_insert(RateLimitEntry {
                count: 0,
                reset_at: now,
            });

        if entry.count == 0 || now > entry.reset_at {
            entry.count = 1;
            entry.reset_at = now + self.window;
            return Ok(());
        }

        if entry.count < self.max_requests {
            entry.count += 1;
            debug!(actor = %actor, count = entry.count, "call admitted");
            return Ok(());
        }

        let retry_in = entry.reset_at.saturating_duration_since(now);
        warn!(
            actor = %actor,
            limit = self.max_requests,
            "rate limit exceeded, window resets in {}s",
            retry_in.as_secs()
        );
        Err(Error::RateLimited(format!(
            "limit of {} requests per {}s reached, retry in {}s",
            self.max_requests,
            self.window.as_secs(),
            retry_in.as_secs().max(1)
        )))
    }

    /// Number of actors with a live window.
    pub fn tracked_actors(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, actor: &ActorId) -> Option<RateLimitEntry> {
        self.entries.get(actor).map(|e| *e)
    }

    fn sweep(&self, now: Instant) {
        self.entries.retain(|_, entry| now <= entry.reset_at);
    }
}

impl AdmissionControl for RateLimiter {
    fn check_and_consume(&self, actor: &ActorId) -> Result<()> {
        self.check_and_consume_at(actor, Instant::now())
    }
}
