//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;

use conduit_config::{
    Config, HealthEndpointConfig, ProviderConfig, RateLimitConfig, RetryConfig, ServerConfig,
};
use conduit_core::ProviderKind;
use secrecy::SecretString;

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with minimal defaults and near-instant retries
    pub fn new() -> Self {
        let mut config = Config {
            server: ServerConfig {
                listen_address: Some(SocketAddr::from(([127, 0, 0, 1], 0))),
                health: HealthEndpointConfig {
                    enabled: true,
                    ..HealthEndpointConfig::default()
                },
                ..ServerConfig::default()
            },
            retry: RetryConfig {
                base_delay_ms: 1,
                max_delay_ms: 5,
                ..RetryConfig::default()
            },
            ..Config::default()
        };
        config.retraining.enabled = false;

        Self { config }
    }

    /// Add a hosted-API provider pointed at a mock backend
    pub fn with_hosted_provider(mut self, name: &str, base_url: &str, models: &[&str]) -> Self {
        self.config.providers.insert(
            name.to_owned(),
            ProviderConfig {
                kind: ProviderKind::HostedApi,
                base_url: Some(base_url.parse().expect("valid URL")),
                api_key: Some(SecretString::from("test-key")),
                timeout_ms: 2_000,
                cost_per_1k_tokens: 0.03,
                models: models.iter().map(|m| (*m).to_owned()).collect(),
            },
        );
        self
    }

    /// Add a local-inference provider pointed at a mock backend
    pub fn with_local_provider(mut self, name: &str, base_url: &str) -> Self {
        self.config.providers.insert(
            name.to_owned(),
            ProviderConfig {
                kind: ProviderKind::LocalInference,
                base_url: Some(base_url.parse().expect("valid URL")),
                api_key: None,
                timeout_ms: 2_000,
                cost_per_1k_tokens: 0.0,
                models: Vec::new(),
            },
        );
        self
    }

    /// Trip breakers after a single failing call
    pub fn with_sensitive_breaker(mut self) -> Self {
        self.config.circuit_breaker.volume_threshold = 1;
        self.config.circuit_breaker.reset_timeout_ms = 60_000;
        self
    }

    /// Set retry attempts per candidate
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.config.retry.max_attempts = attempts;
        self
    }

    /// Set rate limit configuration
    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.config.server.rate_limit = Some(config);
        self
    }

    /// Disable health endpoint
    pub fn without_health(mut self) -> Self {
        self.config.server.health.enabled = false;
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config
    }
}
