//! Provider trait and implementations for model backends

pub mod hosted;
pub mod local;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conduit_config::ProviderConfig;
use conduit_core::ProviderKind;
use indexmap::IndexMap;
use reqwest::StatusCode;

use crate::error::ProviderError;
use crate::types::{Completion, GenerationParams, ModelDescriptor};

/// Providers keyed by name, in configuration order
pub type ProviderMap = IndexMap<String, Arc<dyn Provider>>;

/// Trait implemented by each model backend
#[async_trait]
pub trait Provider: Send + Sync {
    /// Configured provider name
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Base URL, reported as the endpoint of discovered models
    fn endpoint(&self) -> &str;

    /// Per-call timeout
    fn timeout(&self) -> Duration;

    /// Models the provider currently serves
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, ProviderError>;

    /// Run a single non-streaming generation
    async fn invoke(
        &self,
        model: &str,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Completion, ProviderError>;
}

/// Construct the provider for a configuration entry
pub fn build(name: &str, config: &ProviderConfig) -> Arc<dyn Provider> {
    match config.kind {
        ProviderKind::LocalInference => Arc::new(local::LocalProvider::new(name.to_owned(), config)),
        ProviderKind::HostedApi => Arc::new(hosted::HostedProvider::new(name.to_owned(), config)),
    }
}

/// Construct every configured provider
pub fn build_all<'a>(configs: impl IntoIterator<Item = (&'a String, &'a ProviderConfig)>) -> ProviderMap {
    configs
        .into_iter()
        .map(|(name, config)| (name.clone(), build(name, config)))
        .collect()
}

/// Map a non-success HTTP status onto the error taxonomy
pub fn classify_status(status: StatusCode) -> ProviderError {
    let code = status.as_u16();
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth { status: code },
        s if s.is_server_error() => ProviderError::Transient { status: code },
        _ => ProviderError::BadRequest { status: code },
    }
}

/// Map a transport failure onto the error taxonomy
pub fn classify_transport(error: &reqwest::Error, timeout: Duration) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout {
            after_ms: duration_ms(timeout),
        }
    } else if error.is_decode() {
        ProviderError::InvalidResponse(error.to_string())
    } else {
        ProviderError::Network(error.to_string())
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Fail with the classified status of an unsuccessful response
async fn check_status(provider: &str, response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(provider, status = %status, "provider returned error");
    tracing::debug!(provider, body = %truncate(&body, 512), "provider error body");

    Err(classify_status(status))
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
