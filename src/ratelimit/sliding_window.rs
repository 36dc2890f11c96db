//! Sliding-window log strategy.
//!
//! Every request is logged with its timestamp. A request is counted against
//! all logged events of the same key inside `[now - duration, now]`, so there
//! are no window boundaries for a client to burst across.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{trace, warn};
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use super::strategy::{window_delta, Decision, RateLimitRequest, Strategy, StrategyError};
use crate::store::{WindowEvent, WindowStore};

/// Default upper bound on one store round trip.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(250);

/// Sliding-window log strategy over a [`WindowStore`].
pub struct SlidingWindowStrategy {
    store: Arc<dyn WindowStore>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl SlidingWindowStrategy {
    /// Create a strategy over `store` using the system clock.
    pub fn new(store: Arc<dyn WindowStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock::new()))
    }

    /// Create a strategy over `store` reading time from `clock`.
    pub fn with_clock(store: Arc<dyn WindowStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Bound each store round trip by `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Strategy for SlidingWindowStrategy {
    async fn run(&self, request: &RateLimitRequest) -> Result<Decision, StrategyError> {
        let window = window_delta(request.duration)?;
        let now = self.clock.now();
        let now_micros = now.timestamp_micros();

        let event = WindowEvent {
            key: request.key.clone(),
            member: format!("{}-{}", now_micros, Uuid::new_v4()),
            now_micros,
            window_start_micros: now_micros.saturating_sub(window.num_microseconds().unwrap_or(i64::MAX)),
            ttl: request.duration,
        };

        let total_requests = match tokio::time::timeout(self.timeout, self.store.record(&event)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(timeout = ?self.timeout, "Rate limit store timed out");
                return Err(StrategyError::Timeout(self.timeout));
            }
        };

        let decision = Decision::from_count(total_requests, request.limit, now + window);

        trace!(
            total_requests = decision.total_requests,
            limit = request.limit,
            state = %decision.state,
            "Sliding window evaluated"
        );

        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::MockClock;
    use crate::ratelimit::strategy::State;
    use crate::store::{MemoryWindowStore, StoreError};
    use chrono::{TimeZone, Utc};

    fn request(key: &str, limit: u64, secs: u64) -> RateLimitRequest {
        RateLimitRequest {
            key: key.to_string(),
            limit,
            duration: Duration::from_secs(secs),
        }
    }

    fn strategy() -> (SlidingWindowStrategy, MockClock) {
        let clock = MockClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        let strategy =
            SlidingWindowStrategy::with_clock(Arc::new(MemoryWindowStore::new()), Arc::new(clock.clone()));
        (strategy, clock)
    }

    struct FailingStore;

    #[async_trait]
    impl WindowStore for FailingStore {
        async fn record(&self, _event: &WindowEvent) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    struct StalledStore;

    #[async_trait]
    impl WindowStore for StalledStore {
        async fn record(&self, _event: &WindowEvent) -> Result<u64, StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_counts_increase_within_window() {
        let (strategy, clock) = strategy();
        let req = request("tok1", 10, 10);

        for expected in 1..=5 {
            let decision = strategy.run(&req).await.unwrap();
            assert_eq!(decision.total_requests, expected);
            assert_eq!(decision.state, State::Allow);
            clock.advance(Duration::from_millis(100));
        }
    }

    #[tokio::test]
    async fn test_deny_after_limit() {
        let (strategy, _clock) = strategy();
        let req = request("tok1", 3, 10);

        for _ in 0..3 {
            assert_eq!(strategy.run(&req).await.unwrap().state, State::Allow);
        }
        let denied = strategy.run(&req).await.unwrap();
        assert_eq!(denied.state, State::Deny);
        assert_eq!(denied.total_requests, 4);
    }

    #[tokio::test]
    async fn test_old_events_are_evicted() {
        let (strategy, clock) = strategy();
        let req = request("tok1", 10, 10);

        strategy.run(&req).await.unwrap();
        clock.advance(Duration::from_secs(10) + Duration::from_micros(1));

        let decision = strategy.run(&req).await.unwrap();
        assert_eq!(decision.total_requests, 1);
    }

    #[tokio::test]
    async fn test_window_slides_instead_of_resetting() {
        let (strategy, clock) = strategy();
        let req = request("tok1", 10, 10);

        strategy.run(&req).await.unwrap();
        clock.advance(Duration::from_secs(6));
        strategy.run(&req).await.unwrap();
        clock.advance(Duration::from_secs(6));

        // the first event left the window, the second is still inside
        assert_eq!(strategy.run(&req).await.unwrap().total_requests, 2);
    }

    #[tokio::test]
    async fn test_expires_at_is_now_plus_duration() {
        let (strategy, clock) = strategy();
        let decision = strategy.run(&request("tok1", 10, 10)).await.unwrap();
        assert_eq!(decision.expires_at, clock.now() + chrono::Duration::seconds(10));
    }

    #[tokio::test]
    async fn test_keys_do_not_affect_each_other() {
        let (strategy, _clock) = strategy();
        for _ in 0..5 {
            strategy.run(&request("a", 10, 10)).await.unwrap();
        }
        assert_eq!(strategy.run(&request("b", 10, 10)).await.unwrap().total_requests, 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_all_counted() {
        let (strategy, _clock) = strategy();
        let strategy = Arc::new(strategy);

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let strategy = strategy.clone();
                tokio::spawn(async move { strategy.run(&request("shared", 100, 10)).await.unwrap() })
            })
            .collect();

        let mut totals = Vec::new();
        for handle in handles {
            totals.push(handle.await.unwrap().total_requests);
        }
        totals.sort_unstable();
        assert_eq!(totals, (1..=50).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_store_failure_is_an_error() {
        let strategy = SlidingWindowStrategy::new(Arc::new(FailingStore));
        let err = strategy.run(&request("tok1", 10, 10)).await.unwrap_err();
        assert!(matches!(err, StrategyError::Store(_)));
    }

    #[tokio::test]
    async fn test_store_timeout_is_an_error() {
        let strategy =
            SlidingWindowStrategy::new(Arc::new(StalledStore)).timeout(Duration::from_millis(20));
        let err = strategy.run(&request("tok1", 10, 10)).await.unwrap_err();
        assert!(matches!(err, StrategyError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_zero_duration_rejected() {
        let (strategy, _clock) = strategy();
        let err = strategy.run(&request("tok1", 10, 0)).await.unwrap_err();
        assert!(matches!(err, StrategyError::InvalidRequest(_)));
    }
}
