//! Counting strategy contract.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::store::StoreError;

/// Outcome of a rate limit evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// The request is within the limit
    Allow,
    /// The request exceeded the limit
    Deny,
}

impl State {
    /// Header representation of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Allow => "Allow",
            State::Deny => "Deny",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRequest {
    /// Partition key of the client
    pub key: String,
    /// Maximum requests allowed in the window
    pub limit: u64,
    /// Window length
    pub duration: Duration,
}

/// The result of running a strategy for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed
    pub state: State,
    /// Requests counted in the current window, including this one
    pub total_requests: u64,
    /// When the current window ends
    pub expires_at: DateTime<Utc>,
}

impl Decision {
    /// Build a decision from a window count against `limit`.
    pub fn from_count(total_requests: u64, limit: u64, expires_at: DateTime<Utc>) -> Self {
        let state = if total_requests > limit {
            State::Deny
        } else {
            State::Allow
        };
        Self {
            state,
            total_requests,
            expires_at,
        }
    }

    /// True when the request was denied.
    pub fn is_denied(&self) -> bool {
        self.state == State::Deny
    }
}

/// Failures of the rate limiting infrastructure itself.
///
/// These are never a decision: callers must fail closed.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// The backing store failed
    #[error("rate limit store failed: {0}")]
    Store(#[from] StoreError),

    /// The backing store did not answer in time
    #[error("rate limit store timed out after {0:?}")]
    Timeout(Duration),

    /// The request cannot be evaluated with this strategy
    #[error("invalid rate limit request: {0}")]
    InvalidRequest(String),
}

/// A counting algorithm that decides whether a request is within its limit.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Record one event for `request.key` and decide on it.
    async fn run(&self, request: &RateLimitRequest) -> Result<Decision, StrategyError>;
}

/// Convert a window length to a chrono duration, rejecting lengths chrono
/// cannot represent.
pub(crate) fn window_delta(duration: Duration) -> Result<chrono::Duration, StrategyError> {
    if duration.is_zero() {
        return Err(StrategyError::InvalidRequest(
            "window duration must be non-zero".to_string(),
        ));
    }
    chrono::Duration::from_std(duration)
        .map_err(|e| StrategyError::InvalidRequest(format!("window duration out of range: {e}")))
}
