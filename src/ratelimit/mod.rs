//! Rate limiting logic.

mod clock;
mod extractor;
mod fixed_window;
mod limiter;
mod sliding_window;
mod strategy;

pub use clock::{Clock, MockClock, SystemClock};
pub use extractor::{ExtractError, Extractor, HeaderExtractor, KEY_SEPARATOR};
pub use fixed_window::FixedWindowStrategy;
pub use limiter::{LimiterError, RateLimiter, RateLimiterConfig};
pub use sliding_window::{SlidingWindowStrategy, DEFAULT_STORE_TIMEOUT};
pub use strategy::{Decision, RateLimitRequest, State, Strategy, StrategyError};
