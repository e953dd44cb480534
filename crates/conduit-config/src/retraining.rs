use serde::Deserialize;

/// Periodic retraining of scoring weights from recorded outcomes
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrainingConfig {
    pub enabled: bool,
    /// Seconds between cycles
    pub interval_secs: u64,
    /// Only records newer than this many days are used
    pub lookback_days: u32,
    /// Cap on records pulled per cycle
    pub max_records: usize,
    /// Weight kept from the current table, `new = α·old + (1−α)·observed`
    pub smoothing: f64,
    /// Minimum records before a bucket or family is allowed to move
    pub min_samples: usize,
}

impl Default for RetrainingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3_600,
            lookback_days: 30,
            max_records: 10_000,
            smoothing: 0.7,
            min_samples: 5,
        }
    }
}
