//! Inkwell - rate limited write path for a blog CMS backend
//!
//! Authenticated write endpoints are wrapped in a per-client sliding-window
//! rate limiter. Counters live in Redis, so every API instance enforces the
//! same limit for a client.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod store;
