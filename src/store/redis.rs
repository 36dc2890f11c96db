//! Redis-backed window store.
//!
//! Each key maps to a sorted set whose members are event ids and whose scores
//! are event timestamps in microseconds. A single Lua script prunes, inserts,
//! refreshes the TTL and counts, so Redis runs the whole sequence without
//! interleaving other clients' commands on the same key.

use std::fmt;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, Script};
use tracing::{debug, trace};

use super::{StoreError, WindowEvent, WindowStore};

/// KEYS[1] = log key
/// ARGV[1] = event score, ARGV[2] = window start, ARGV[3] = member, ARGV[4] = ttl ms
///
/// Scores are passed as strings so Lua never reformats them as floats.
const RECORD_SCRIPT: &str = r#"
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', '(' .. ARGV[2])
redis.call('ZADD', KEYS[1], ARGV[1], ARGV[3])
redis.call('PEXPIRE', KEYS[1], ARGV[4])
return redis.call('ZCARD', KEYS[1])
"#;

/// Window store shared by every instance pointing at the same Redis.
pub struct RedisWindowStore {
    connection: ConnectionManager,
    key_prefix: String,
    script: Script,
}

impl fmt::Debug for RedisWindowStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisWindowStore")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl RedisWindowStore {
    /// Connect to Redis at `url`.
    ///
    /// The connection manager reconnects on its own after failures.
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        let key_prefix = key_prefix.into();

        debug!(key_prefix = %key_prefix, "Connected window store to Redis");

        Ok(Self {
            connection,
            key_prefix,
            script: Script::new(RECORD_SCRIPT),
        })
    }

    /// Round trip a PING to verify the connection.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        if reply != "PONG" {
            return Err(StoreError::MalformedReply(reply));
        }
        Ok(())
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl WindowStore for RedisWindowStore {
    async fn record(&self, event: &WindowEvent) -> Result<u64, StoreError> {
        let key = self.key(&event.key);
        let ttl_ms = event.ttl.as_millis().max(1) as u64;
        let mut conn = self.connection.clone();

        let count: i64 = self
            .script
            .key(&key)
            .arg(event.now_micros.to_string())
            .arg(event.window_start_micros.to_string())
            .arg(&event.member)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await?;

        trace!(key = %key, count, "Recorded window event");

        u64::try_from(count).map_err(|_| StoreError::MalformedReply(count.to_string()))
    }
}
