//! Tower middleware that puts a [`RateLimiter`] in front of a service.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use chrono::SecondsFormat;
use futures::future::BoxFuture;
use tower::{Layer, Service};
use tracing::debug;

use super::response::ErrorResponse;
use crate::ratelimit::{Decision, LimiterError, RateLimiter};

/// Requests counted in the current window.
pub const TOTAL_REQUESTS_HEADER: HeaderName =
    HeaderName::from_static("rate-limiting-total-requests");
/// `Allow` or `Deny`.
pub const STATE_HEADER: HeaderName = HeaderName::from_static("rate-limiting-state");
/// RFC 3339 timestamp at which the current window ends.
pub const EXPIRES_AT_HEADER: HeaderName = HeaderName::from_static("rate-limiting-expires-at");

/// Applies a [`RateLimiter`] to every request of the wrapped service.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
}

impl RateLimitLayer {
    /// Create a layer sharing `limiter`.
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

/// Service produced by [`RateLimitLayer`].
///
/// Denied requests and requests that could not be evaluated are answered here
/// and never reach the inner service.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
}

impl<S> Service<Request> for RateLimitService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let limiter = self.limiter.clone();
        // The clone may not be ready, so keep the service poll_ready was called on.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let decision = match limiter.evaluate(request.headers()).await {
                Ok(decision) => decision,
                Err(err @ LimiterError::Extract(_)) => {
                    return Ok(ErrorResponse::bad_request(err.to_string()).into_response());
                }
                Err(LimiterError::Strategy(_)) => {
                    return Ok(ErrorResponse::internal().into_response());
                }
            };

            if decision.is_denied() {
                debug!(
                    method = %request.method(),
                    path = %request.uri().path(),
                    total_requests = decision.total_requests,
                    "Request denied by rate limiter"
                );
                let mut response = ErrorResponse::too_many_requests().into_response();
                set_rate_limit_headers(response.headers_mut(), &decision);
                return Ok(response);
            }

            let mut response = inner.call(request).await?;
            set_rate_limit_headers(response.headers_mut(), &decision);
            Ok(response)
        })
    }
}

/// Write the decision's headers, replacing any existing values.
pub fn set_rate_limit_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(TOTAL_REQUESTS_HEADER, HeaderValue::from(decision.total_requests));
    headers.insert(STATE_HEADER, HeaderValue::from_static(decision.state.as_str()));

    let expires_at = decision.expires_at.to_rfc3339_opts(SecondsFormat::Secs, true);
    if let Ok(value) = HeaderValue::from_str(&expires_at) {
        headers.insert(EXPIRES_AT_HEADER, value);
    }
}
