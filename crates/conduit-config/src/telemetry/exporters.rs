use std::collections::HashMap;

use serde::Deserialize;
use url::Url;

/// OTLP exporter configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterConfig {
    /// Collector endpoint
    pub endpoint: Url,
    #[serde(default)]
    pub protocol: ExportProtocol,
    /// Extra headers sent with every HTTP export
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub batch: Option<BatchConfig>,
}

/// OTLP transport
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportProtocol {
    #[default]
    Grpc,
    HttpProto,
}

/// Periodic export settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    /// Seconds between metric exports
    #[serde(default = "default_export_interval")]
    pub scheduled_delay: u64,
}

fn default_export_interval() -> u64 {
    30
}
