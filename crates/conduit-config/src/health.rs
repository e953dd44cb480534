use serde::Deserialize;

/// Thresholds used to derive model health and drive active probing
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthPolicyConfig {
    /// Error rate above which a model is degraded
    pub degraded_error_rate: f64,
    /// Error rate above which a model is unhealthy
    pub unhealthy_error_rate: f64,
    /// Consecutive failed listings that mark a model degraded
    pub probe_failure_threshold: u32,
    /// Seconds between discovery passes
    pub probe_interval_secs: u64,
    /// Missed listings before a model is marked stale
    pub stale_after_missed_refreshes: u32,
    /// Outcomes kept per model for the rolling metrics
    pub observation_window: usize,
}

impl Default for HealthPolicyConfig {
    fn default() -> Self {
        Self {
            degraded_error_rate: 0.05,
            unhealthy_error_rate: 0.15,
            probe_failure_threshold: 2,
            probe_interval_secs: 60,
            stale_after_missed_refreshes: 3,
            observation_window: 100,
        }
    }
}
