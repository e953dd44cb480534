use conduit_core::ProviderKind;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

const LOCAL_INFERENCE_URL: &str = "http://localhost:11434";
const HOSTED_API_URL: &str = "https://api.openai.com/v1";

/// Configuration for a single model provider
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Wire protocol spoken by the provider
    #[serde(rename = "type")]
    pub kind: ProviderKind,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Bearer token, hosted providers only
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Per-call timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Estimated price per thousand tokens, used for benchmarks
    #[serde(default)]
    pub cost_per_1k_tokens: f64,
    /// Models registered at startup even when the listing endpoint is unreachable
    #[serde(default)]
    pub models: Vec<String>,
}

impl ProviderConfig {
    /// Effective base URL without a trailing slash
    pub fn base_url(&self) -> String {
        let url = self.base_url.as_ref().map_or_else(
            || match self.kind {
                ProviderKind::LocalInference => LOCAL_INFERENCE_URL.to_owned(),
                ProviderKind::HostedApi => HOSTED_API_URL.to_owned(),
            },
            |u| u.as_str().to_owned(),
        );

        url.trim_end_matches('/').to_owned()
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}
