use serde::{Deserialize, Serialize};

/// Kind of backend hosting a set of models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProviderKind {
    /// Self-hosted inference server (Ollama-style API)
    LocalInference,
    /// Hosted OpenAI-compatible API
    HostedApi,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn serde_and_display_agree() {
        let json = serde_json::to_string(&ProviderKind::LocalInference).unwrap();
        assert_eq!(json, "\"local_inference\"");
        assert_eq!(ProviderKind::HostedApi.to_string(), "hosted_api");
        assert_eq!(ProviderKind::from_str("hosted_api").unwrap(), ProviderKind::HostedApi);
    }
}
