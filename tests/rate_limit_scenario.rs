//! End-to-end behaviour of the rate limited write routes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use tower::ServiceExt;

use inkwell::http::{router, ErrorResponse, EXPIRES_AT_HEADER, STATE_HEADER, TOTAL_REQUESTS_HEADER};
use inkwell::ratelimit::{
    HeaderExtractor, MockClock, RateLimiter, RateLimiterConfig, SlidingWindowStrategy,
};
use inkwell::store::{MemoryWindowStore, StoreError, WindowEvent, WindowStore};

fn app_with_store(store: Arc<dyn WindowStore>, clock: MockClock) -> Router {
    let strategy = SlidingWindowStrategy::with_clock(store, Arc::new(clock));
    router(Arc::new(RateLimiter::new(RateLimiterConfig {
        extractor: Arc::new(HeaderExtractor::new(["Authorization"])),
        strategy: Arc::new(strategy),
        expiration: Duration::from_secs(10),
        max_requests: 30,
    })))
}

fn start_clock() -> MockClock {
    MockClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
}

fn create_post(token: &str) -> Request<Body> {
    Request::post("/posts")
        .header("authorization", token)
        .body(Body::empty())
        .unwrap()
}

fn header<'a>(response: &'a axum::response::Response, name: &axum::http::HeaderName) -> &'a str {
    response.headers()[name].to_str().unwrap()
}

#[tokio::test]
async fn thirty_allowed_then_denied_then_other_client_allowed() {
    let clock = start_clock();
    let app = app_with_store(Arc::new(MemoryWindowStore::new()), clock.clone());

    for expected in 1..=30u64 {
        let response = app.clone().oneshot(create_post("tok1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "request {expected} should pass");
        assert_eq!(header(&response, &STATE_HEADER), "Allow");
        assert_eq!(header(&response, &TOTAL_REQUESTS_HEADER), expected.to_string());
        clock.advance(Duration::from_millis(30));
    }

    let denied = app.clone().oneshot(create_post("tok1")).await.unwrap();
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&denied, &STATE_HEADER), "Deny");
    assert_eq!(header(&denied, &TOTAL_REQUESTS_HEADER), "31");
    assert_eq!(header(&denied, &EXPIRES_AT_HEADER), "2024-05-01T12:00:10Z");

    let body = denied.into_body().collect().await.unwrap().to_bytes();
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.status, 429);

    let other = app.oneshot(create_post("tok2")).await.unwrap();
    assert_eq!(other.status(), StatusCode::OK);
    assert_eq!(header(&other, &STATE_HEADER), "Allow");
    assert_eq!(header(&other, &TOTAL_REQUESTS_HEADER), "1");
}

#[tokio::test]
async fn client_recovers_once_the_window_has_passed() {
    let clock = start_clock();
    let app = app_with_store(Arc::new(MemoryWindowStore::new()), clock.clone());

    for _ in 0..31 {
        app.clone().oneshot(create_post("tok1")).await.unwrap();
    }
    clock.advance(Duration::from_secs(10) + Duration::from_millis(1));

    let response = app.oneshot(create_post("tok1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, &TOTAL_REQUESTS_HEADER), "1");
}

struct DownStore;

#[async_trait]
impl WindowStore for DownStore {
    async fn record(&self, _event: &WindowEvent) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn unreachable_store_rejects_with_server_error() {
    let app = app_with_store(Arc::new(DownStore), start_clock());

    let response = app.oneshot(create_post("tok1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().get(&STATE_HEADER).is_none());

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.status, 500);
    assert_eq!(error.message, "Internal server error.");
}

#[tokio::test]
async fn missing_authorization_is_a_client_error() {
    let app = app_with_store(Arc::new(MemoryWindowStore::new()), start_clock());

    let response = app
        .oneshot(Request::delete("/posts/my-post").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
