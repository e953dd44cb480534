use serde::Deserialize;

/// Circuit breaker policy, applied to each provider independently
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CircuitBreakerConfig {
    /// Failure percentage within the window that trips the breaker
    pub error_threshold_percent: f64,
    /// Length of the sliding outcome window
    pub window_ms: u64,
    /// Minimum calls in the window before the percentage is evaluated
    pub volume_threshold: u32,
    /// Cool-down before an open breaker admits a probe
    pub reset_timeout_ms: u64,
    /// Cool-down growth after a failed probe
    pub backoff_multiplier: f64,
    /// Upper bound for the grown cool-down
    pub max_reset_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            error_threshold_percent: 50.0,
            window_ms: 60_000,
            volume_threshold: 5,
            reset_timeout_ms: 30_000,
            backoff_multiplier: 2.0,
            max_reset_timeout_ms: 300_000,
        }
    }
}

/// Bounded retry within a single model attempt
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Exponential growth factor between retries
    pub factor: f64,
    /// Upper bound for a single delay
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            factor: 2.0,
            max_delay_ms: 8_000,
        }
    }
}
