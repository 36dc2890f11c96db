//! JSON error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Message sent with every 429.
pub const TOO_MANY_REQUESTS_MESSAGE: &str =
    "you have sent too many requests to this service, slow down please";

/// Message sent with every 500, so internal failures are never leaked.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error.";

/// The body of every error response: `{"status": 429, "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status code, repeated in the body
    pub status: u16,
    /// Human readable explanation
    pub message: String,
}

impl ErrorResponse {
    /// Create an error response with an arbitrary status.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            message: message.into(),
        }
    }

    /// 400 carrying the reason the request was rejected.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// 500 with a fixed message.
    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
    }

    /// 429 with a fixed message.
    pub fn too_many_requests() -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, TOO_MANY_REQUESTS_MESSAGE)
    }

    /// 404 with a fixed message.
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Resource not found.")
    }

    /// The status as a `StatusCode`.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::CONTENT_TYPE;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_into_response_sets_status_and_json_body() {
        let response = ErrorResponse::too_many_requests().into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.status, 429);
        assert_eq!(parsed.message, TOO_MANY_REQUESTS_MESSAGE);
    }

    #[test]
    fn test_constructors() {
        assert_eq!(ErrorResponse::bad_request("nope").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorResponse::internal().message, INTERNAL_ERROR_MESSAGE);
        assert_eq!(ErrorResponse::not_found().status, 404);
    }
}
