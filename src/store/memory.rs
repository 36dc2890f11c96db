//! In-process window store.
//!
//! Used for tests and single-node development. State is lost on restart and is
//! not shared between processes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::{StoreError, WindowEvent, WindowStore};

#[derive(Debug, Default)]
struct WindowLog {
    /// Event timestamps in microseconds, in insertion order
    events: VecDeque<i64>,
    /// When the log expires, microseconds since the epoch
    expires_at: i64,
}

/// A sharded in-memory event log per key.
///
/// Only the shard holding a key is locked while that key is updated; keys in
/// other shards proceed in parallel.
///
/// Expired logs are swept inline, at most once per window length, so keys that
/// never come back do not accumulate.
#[derive(Debug, Default)]
pub struct MemoryWindowStore {
    logs: DashMap<String, WindowLog>,
    /// Earliest time of the next sweep, microseconds since the epoch
    next_sweep: AtomicI64,
}

impl MemoryWindowStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held, including expired ones not yet swept.
    pub fn key_count(&self) -> usize {
        self.logs.len()
    }

    /// Clear all logs.
    pub fn clear(&self) {
        self.logs.clear();
    }

    /// Remove every log that expired before `now_micros`, returning how many
    /// were removed.
    pub fn remove_expired(&self, now_micros: i64) -> usize {
        let before = self.logs.len();
        self.logs.retain(|_, log| log.expires_at >= now_micros);
        before.saturating_sub(self.logs.len())
    }

    fn maybe_sweep(&self, now_micros: i64, interval_micros: i64) {
        let next = self.next_sweep.load(Ordering::Relaxed);
        if now_micros < next {
            return;
        }
        let following = now_micros.saturating_add(interval_micros);
        // Only the caller that wins the exchange sweeps.
        if self
            .next_sweep
            .compare_exchange(next, following, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            let removed = self.remove_expired(now_micros);
            if removed > 0 {
                debug!(removed, remaining = self.logs.len(), "Swept expired window logs");
            }
        }
    }
}

#[async_trait]
impl WindowStore for MemoryWindowStore {
    async fn record(&self, event: &WindowEvent) -> Result<u64, StoreError> {
        let ttl_micros = i64::try_from(event.ttl.as_micros())
            .map_err(|_| StoreError::Unavailable("ttl out of range".to_string()))?;

        // Must run before the entry guard below is taken.
        self.maybe_sweep(event.now_micros, ttl_micros);

        let mut log = self.logs.entry(event.key.clone()).or_default();

        // Mirrors key expiry in Redis: an expired log starts over.
        if log.expires_at < event.now_micros {
            log.events.clear();
        }

        log.events.retain(|&ts| ts >= event.window_start_micros);
        log.events.push_back(event.now_micros);
        log.expires_at = event.now_micros.saturating_add(ttl_micros);

        Ok(log.events.len() as u64)
    }
}
