//! HTTP adapter: middleware, error bodies, routing and the server.

mod layer;
mod response;
mod routes;
mod server;

pub use layer::{
    set_rate_limit_headers, RateLimitLayer, RateLimitService, EXPIRES_AT_HEADER, STATE_HEADER,
    TOTAL_REQUESTS_HEADER,
};
pub use response::{ErrorResponse, INTERNAL_ERROR_MESSAGE, TOO_MANY_REQUESTS_MESSAGE};
pub use routes::router;
pub use server::HttpServer;
