use std::net::SocketAddr;

use serde::Deserialize;

use crate::rate_limit::RateLimitConfig;

/// HTTP server configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind, defaults to `0.0.0.0:8080`
    pub listen_address: Option<SocketAddr>,
    /// Liveness endpoint
    #[serde(default)]
    pub health: HealthEndpointConfig,
    /// Request rate limiting
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
}

/// Liveness endpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthEndpointConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for HealthEndpointConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            path: default_path(),
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_enabled() -> bool {
    true
}

fn default_path() -> String {
    "/health".to_owned()
}
