//! Configuration model for Conduit
//!
//! Everything is read from a single TOML file. Each section has
//! defaults, so a minimal file only needs a `[providers.<name>]` table.

#![allow(clippy::must_use_candidate)]

mod env;
pub mod health;
mod loader;
pub mod providers;
pub mod rate_limit;
pub mod resilience;
pub mod retraining;
pub mod scoring;
pub mod server;
pub mod telemetry;

use indexmap::IndexMap;
use serde::Deserialize;

pub use health::*;
pub use providers::*;
pub use rate_limit::*;
pub use resilience::*;
pub use retraining::*;
pub use scoring::*;
pub use server::*;
pub use telemetry::TelemetryConfig;

/// Top-level Conduit configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Model providers keyed by name, in declaration order
    #[serde(default)]
    pub providers: IndexMap<String, ProviderConfig>,
    /// Per-provider circuit breaker policy
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    /// Per-call retry policy
    #[serde(default)]
    pub retry: RetryConfig,
    /// Model health thresholds and probing
    #[serde(default)]
    pub health: HealthPolicyConfig,
    /// Suggestion scoring defaults
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Feedback-driven retraining of scoring weights
    #[serde(default)]
    pub retraining: RetrainingConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
