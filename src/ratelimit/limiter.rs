//! Core rate limiter: key extraction plus counting.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use thiserror::Error;
use tracing::{debug, error, trace};

use super::extractor::{ExtractError, Extractor, HeaderExtractor};
use super::strategy::{Decision, RateLimitRequest, Strategy, StrategyError};
use crate::config::RateLimitingConfig;

/// Everything a [`RateLimiter`] needs.
#[derive(Clone)]
pub struct RateLimiterConfig {
    /// How the key is derived from a request
    pub extractor: Arc<dyn Extractor>,
    /// How events are counted
    pub strategy: Arc<dyn Strategy>,
    /// Window length
    pub expiration: Duration,
    /// Maximum requests per window
    pub max_requests: u64,
}

impl RateLimiterConfig {
    /// Header-keyed limiter settings from configuration, counting with
    /// `strategy`.
    pub fn from_settings(settings: &RateLimitingConfig, strategy: Arc<dyn Strategy>) -> Self {
        Self {
            extractor: Arc::new(HeaderExtractor::new(settings.headers.iter().cloned())),
            strategy,
            expiration: settings.expiration(),
            max_requests: settings.max_requests,
        }
    }
}

/// Why a request could not be evaluated.
#[derive(Debug, Error)]
pub enum LimiterError {
    /// The client did not send the identifying attributes
    #[error("failed to collect rate limiting key from request: {0}")]
    Extract(#[from] ExtractError),

    /// The counting infrastructure failed
    #[error("failed to run rate limiting for request: {0}")]
    Strategy(#[from] StrategyError),
}

/// Decides whether requests may proceed.
///
/// Cheap to share behind an `Arc`; holds no mutable state of its own.
pub struct RateLimiter {
    config: RateLimiterConfig,
}

impl RateLimiter {
    /// Create a rate limiter from its configuration.
    pub fn new(config: RateLimiterConfig) -> Self {
        Self { config }
    }

    /// Configured window length.
    pub fn expiration(&self) -> Duration {
        self.config.expiration
    }

    /// Configured limit per window.
    pub fn max_requests(&self) -> u64 {
        self.config.max_requests
    }

    /// Evaluate one request.
    ///
    /// The strategy is only consulted once a key was extracted. Both Allow and
    /// Deny come back as `Ok`.
    pub async fn evaluate(&self, headers: &HeaderMap) -> Result<Decision, LimiterError> {
        let key = self.config.extractor.extract(headers).map_err(|e| {
            debug!(error = %e, "failed to collect rate limiting key from request");
            e
        })?;

        let request = RateLimitRequest {
            key,
            limit: self.config.max_requests,
            duration: self.config.expiration,
        };

        let decision = self.config.strategy.run(&request).await.map_err(|e| {
            error!(error = %e, "failed to run rate limiting for request");
            e
        })?;

        if decision.is_denied() {
            debug!(
                total_requests = decision.total_requests,
                limit = request.limit,
                "Rate limit exceeded"
            );
        } else {
            trace!(
                total_requests = decision.total_requests,
                limit = request.limit,
                "Rate limit check passed"
            );
        }

        Ok(decision)
    }
}
