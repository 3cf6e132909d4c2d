//! Cancel-on-burst (§4.3): when the venue's recent-message-rate exceeds
//! policy, new Opens are deferred and in-flight Opens are canceled rather
//! than piling retries up against an already-strained venue connection.
//!
//! Single-owner counterpart to the atomic rate-limit trackers this
//! workspace's pack reaches for on the venue-client side: `OrderManager` is
//! driven by exactly one task, so a plain `VecDeque` rolling window needs
//! no atomics.

use std::collections::VecDeque;

use tracing::warn;

#[derive(Clone, Copy, Debug)]
pub struct BurstConfig {
    pub window_ms: i64,
    pub max_messages: usize,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self { window_ms: 1_000, max_messages: 20 }
    }
}

/// Rolling window of venue message timestamps — one entry per `place`/
/// `cancel` call actually sent to the venue.
pub struct BurstTracker {
    timestamps: VecDeque<i64>,
    warned: bool,
}

impl BurstTracker {
    pub fn new() -> Self {
        Self { timestamps: VecDeque::new(), warned: false }
    }

    fn evict_stale(&mut self, now_ms: i64, window_ms: i64) {
        while let Some(&oldest) = self.timestamps.front() {
            if now_ms - oldest > window_ms {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// `true` if sending one more message right now would put the window
    /// at or over `cfg.max_messages`.
    pub fn over_limit(&mut self, now_ms: i64, cfg: &BurstConfig) -> bool {
        self.evict_stale(now_ms, cfg.window_ms);
        let over = self.timestamps.len() >= cfg.max_messages;
        if over && !self.warned {
            warn!(
                window_ms = cfg.window_ms,
                max_messages = cfg.max_messages,
                "venue message rate over cancel-on-burst threshold"
            );
            self.warned = true;
        } else if !over {
            self.warned = false;
        }
        over
    }

    /// Record that a message was actually sent to the venue.
    pub fn record(&mut self, now_ms: i64, cfg: &BurstConfig) {
        self.evict_stale(now_ms, cfg.window_ms);
        self.timestamps.push_back(now_ms);
    }
}

impl Default for BurstTracker {
    fn default() -> Self {
        Self::new()
    }
}
