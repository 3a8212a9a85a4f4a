//! Two-tier request admission: one global fixed window shared by every
//! client, then a sliding window per client identifier.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub per_client_max: u32,
    // 0 disables the global tier
    pub global_max: u32,
    pub window: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Throttled { retry_after_secs: u64 },
}

/// Counter service behind the gateway.
///
/// `admit` checks and records in one step so that two concurrent requests
/// can never both take the last free slot. A throttled request leaves the
/// counters untouched.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn admit(&self, identifier: &str, now: Instant) -> RateDecision;

    /// Drops expired timestamps and forgets identifiers with nothing left.
    /// Returns the number of identifiers evicted.
    async fn sweep(&self, now: Instant) -> usize;

    /// Number of identifiers currently tracked.
    fn tracked_clients(&self) -> usize;
}

// Rate window - request timestamps for one client, oldest first
#[derive(Debug, Default)]
pub struct RateWindow {
    timestamps: VecDeque<Instant>,
}

impl RateWindow {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

#[derive(Debug)]
struct GlobalCounter {
    count: u32,
    window_start: Instant,
}

pub struct InMemoryRateLimiter {
    policy: RateLimitPolicy,
    global: Mutex<GlobalCounter>,
    windows: DashMap<String, RateWindow>,
}

impl InMemoryRateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            global: Mutex::new(GlobalCounter {
                count: 0,
                window_start: Instant::now(),
            }),
            windows: DashMap::new(),
        }
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimiter {
    async fn admit(&self, identifier: &str, now: Instant) -> RateDecision {
        let window = self.policy.window;

        // The global lock is held until the per-client decision is recorded,
        // which serialises the whole check-then-act sequence.
        let mut global = self.global.lock().await;

        if now.saturating_duration_since(global.window_start) >= window {
            global.count = 0;
            global.window_start = now;
        }

        if self.policy.global_max > 0 && global.count >= self.policy.global_max {
            let elapsed = now.saturating_duration_since(global.window_start);
            let retry_after_secs = ceil_secs(window.saturating_sub(elapsed));
            debug!(identifier, retry_after_secs, "global rate limit reached");
            return RateDecision::Throttled { retry_after_secs };
        }

        let mut entry = self.windows.entry(identifier.to_string()).or_default();
        entry.prune(now, window);

        if entry.len() >= self.policy.per_client_max as usize {
            let retry_after_secs = match entry.timestamps.front() {
                Some(&oldest) => {
                    ceil_secs(window.saturating_sub(now.saturating_duration_since(oldest)))
                }
                None => ceil_secs(window),
            };
            debug!(identifier, retry_after_secs, "client rate limit reached");
            return RateDecision::Throttled { retry_after_secs };
        }

        entry.timestamps.push_back(now);
        global.count += 1;
        RateDecision::Allowed
    }

    async fn sweep(&self, now: Instant) -> usize {
        let window = self.policy.window;
        let before = self.windows.len();
        self.windows.retain(|_, entry| {
            entry.prune(now, window);
            !entry.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

// Round up to whole seconds, never below one
fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    secs.max(1)
}
