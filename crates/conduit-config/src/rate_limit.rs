use serde::Deserialize;

/// In-memory request rate limiting
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Limit shared by every caller
    #[serde(default)]
    pub global: Option<RequestRateLimit>,
    /// Limit applied per client IP
    #[serde(default)]
    pub per_ip: Option<RequestRateLimit>,
}

/// Request quota over a window
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestRateLimit {
    /// Maximum requests per window
    pub requests: u32,
    /// Window duration (e.g. "1m", "1h")
    pub window: String,
}
