//! Router assembly.
//!
//! Reads are public. Every authenticated write handler sits behind the rate
//! limiter; the handlers here only acknowledge the request and stand in for
//! the content handlers mounted by the CMS.
//!
//! The limiter is attached to the matched method handlers rather than the
//! whole route, so a 405 for an unsupported method is never counted.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use super::layer::{RateLimitLayer, EXPIRES_AT_HEADER, STATE_HEADER, TOTAL_REQUESTS_HEADER};
use super::response::ErrorResponse;
use crate::ratelimit::RateLimiter;

/// Build the application router.
pub fn router(limiter: Arc<RateLimiter>) -> Router {
    let limited = RateLimitLayer::new(limiter);

    let app = Router::new()
        .route("/", get(root))
        .route("/healthz", get(health))
        .route(
            "/posts",
            get(listed).merge(post(accepted).route_layer(limited.clone())),
        )
        .route(
            "/posts/{slug}",
            get(listed).merge(
                put(accepted)
                    .delete(accepted)
                    .route_layer(limited.clone()),
            ),
        )
        .route(
            "/authors/me",
            get(accepted).put(accepted).route_layer(limited.clone()),
        )
        .route(
            "/authors/{user_id}",
            get(listed).merge(put(accepted).route_layer(limited)),
        )
        .fallback(not_found);

    with_middleware(app)
}

/// Outer middleware shared by every route.
fn with_middleware(app: Router) -> Router {
    app.layer(CatchPanicLayer::custom(panic_response))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = message, "Handler panicked");
    ErrorResponse::internal().into_response()
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([ACCEPT, AUTHORIZATION, CONTENT_TYPE])
        .expose_headers([TOTAL_REQUESTS_HEADER, STATE_HEADER, EXPIRES_AT_HEADER])
        .allow_credentials(true)
        .max_age(Duration::from_secs(300))
}

async fn root() -> &'static str {
    "hello world"
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn accepted(method: Method, uri: Uri) -> Json<Value> {
    Json(json!({
        "status": "accepted",
        "method": method.as_str(),
        "path": uri.path(),
    }))
}

async fn listed(uri: Uri) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "path": uri.path(),
    }))
}

async fn not_found() -> impl IntoResponse {
    ErrorResponse::not_found()
}
