use std::time::Duration;

use conduit_config::{RateLimitConfig, RequestRateLimit};

use crate::error::RateLimitError;
use crate::memory::MemoryLimiter;

const GLOBAL_KEY: &str = "global";

/// Which limit rejected a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    Global,
    PerIp,
}

impl LimitScope {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::PerIp => "per_ip",
        }
    }
}

/// HTTP request-level rate limiter (global and per-IP)
pub struct RequestLimiter {
    global: Option<MemoryLimiter>,
    per_ip: Option<MemoryLimiter>,
}

impl RequestLimiter {
    pub fn new(config: &RateLimitConfig) -> Result<Self, RateLimitError> {
        Ok(Self {
            global: config.global.as_ref().map(build_limiter).transpose()?,
            per_ip: config.per_ip.as_ref().map(build_limiter).transpose()?,
        })
    }

    /// Check the global limit, then the caller's IP
    pub fn check(&self, ip: Option<&str>) -> Result<(), (LimitScope, RateLimitError)> {
        self.check_global().map_err(|e| (LimitScope::Global, e))?;
        if let Some(ip) = ip {
            self.check_ip(ip).map_err(|e| (LimitScope::PerIp, e))?;
        }
        Ok(())
    }

    pub fn check_global(&self) -> Result<(), RateLimitError> {
        self.global.as_ref().map_or(Ok(()), |limiter| limiter.check(GLOBAL_KEY))
    }

    pub fn check_ip(&self, ip: &str) -> Result<(), RateLimitError> {
        self.per_ip.as_ref().map_or(Ok(()), |limiter| limiter.check(ip))
    }
}

fn build_limiter(rate_limit: &RequestRateLimit) -> Result<MemoryLimiter, RateLimitError> {
    MemoryLimiter::new(rate_limit.requests, parse_duration(&rate_limit.window)?)
}

fn parse_duration(s: &str) -> Result<Duration, RateLimitError> {
    duration_str::parse(s).map_err(|e| RateLimitError::Config(format!("invalid duration '{s}': {e}")))
}
