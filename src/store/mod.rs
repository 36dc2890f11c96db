//! Backing stores for sliding-window event logs.
//!
//! A [`WindowStore`] owns the per-key event log. Recording an event must prune
//! stale entries, insert the new one, refresh the key's expiry and count the
//! survivors as one indivisible step.

mod memory;
mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use self::memory::MemoryWindowStore;
pub use self::redis::RedisWindowStore;

/// Errors raised by a window store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Redis could not be reached or rejected the command
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// The store answered with something other than a count
    #[error("malformed store reply: {0}")]
    MalformedReply(String),

    /// The store is unavailable for another reason
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// One event to be recorded in a key's window log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowEvent {
    /// Rate limit key
    pub key: String,
    /// Unique identifier for this event within the key's log
    pub member: String,
    /// Event timestamp, microseconds since the Unix epoch
    pub now_micros: i64,
    /// Events strictly older than this are pruned
    pub window_start_micros: i64,
    /// Time until the whole log expires if no further events arrive
    pub ttl: Duration,
}

/// Storage for per-key sliding-window event logs.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Atomically prune, insert, refresh expiry and return the event count.
    async fn record(&self, event: &WindowEvent) -> Result<u64, StoreError>;
}
