//! In-memory request rate limiting for the Conduit HTTP surface

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod error;
mod memory;
mod request;

pub use error::RateLimitError;
pub use memory::MemoryLimiter;
pub use request::{LimitScope, RequestLimiter};

use conduit_config::RateLimitConfig;

/// Create a request limiter from configuration
pub fn create_request_limiter(config: &RateLimitConfig) -> Result<RequestLimiter, RateLimitError> {
    RequestLimiter::new(config)
}
