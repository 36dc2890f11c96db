//! In-process fixed-window strategy.
//!
//! Counts requests per key in consecutive windows, each anchored at the first
//! request after the previous window elapsed. Cheaper than the sliding log but
//! lets a client burst up to twice the limit across a window boundary, and the
//! counts live only in this process.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::strategy::{window_delta, Decision, RateLimitRequest, Strategy, StrategyError};

/// A counter for one key's current window.
#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    /// Requests counted in this window
    count: u64,
    /// When the window ends
    expires_at: DateTime<Utc>,
}

/// Fixed-window counters held in memory.
///
/// Counters whose window has ended are swept at most once per window length.
pub struct FixedWindowStrategy {
    counters: DashMap<String, WindowCounter>,
    clock: Arc<dyn Clock>,
    /// Earliest time of the next sweep, microseconds since the epoch
    next_sweep: AtomicI64,
}

impl FixedWindowStrategy {
    /// Create a strategy using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Create a strategy reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: DashMap::new(),
            clock,
            next_sweep: AtomicI64::new(i64::MIN),
        }
    }

    /// Get the current count for a key, if a counter exists.
    pub fn counter_value(&self, key: &str) -> Option<u64> {
        self.counters.get(key).map(|c| c.count)
    }

    /// Get the number of active counters.
    pub fn counter_count(&self) -> usize {
        self.counters.len()
    }

    /// Clear all counters.
    pub fn clear(&self) {
        self.counters.clear();
    }

    /// Remove counters whose window ended at or before `now`, returning how
    /// many were removed.
    pub fn remove_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.counters.len();
        self.counters.retain(|_, counter| counter.expires_at > now);
        before.saturating_sub(self.counters.len())
    }

    fn maybe_sweep(&self, now: DateTime<Utc>, window: chrono::Duration) {
        let now_micros = now.timestamp_micros();
        let next = self.next_sweep.load(Ordering::Relaxed);
        if now_micros < next {
            return;
        }
        let following = now_micros.saturating_add(window.num_microseconds().unwrap_or(i64::MAX));
        if self
            .next_sweep
            .compare_exchange(next, following, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            let removed = self.remove_expired(now);
            if removed > 0 {
                debug!(removed, remaining = self.counters.len(), "Swept expired fixed window counters");
            }
        }
    }
}

impl Default for FixedWindowStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Strategy for FixedWindowStrategy {
    async fn run(&self, request: &RateLimitRequest) -> Result<Decision, StrategyError> {
        let window = window_delta(request.duration)?;
        let now = self.clock.now();

        // Must run before the entry guard below is taken.
        self.maybe_sweep(now, window);

        let counter = {
            let mut entry = self
                .counters
                .entry(request.key.clone())
                .or_insert_with(|| {
                    debug!(limit = request.limit, window = ?request.duration, "Creating fixed window counter");
                    WindowCounter {
                        count: 0,
                        expires_at: now + window,
                    }
                });

            if now >= entry.expires_at {
                entry.count = 0;
                entry.expires_at = now + window;
            }
            entry.count += 1;
            *entry
        };

        trace!(count = counter.count, limit = request.limit, "Fixed window evaluated");

        Ok(Decision::from_count(
            counter.count,
            request.limit,
            counter.expires_at,
        ))
    }
}
