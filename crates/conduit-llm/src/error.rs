use std::time::Duration;

use conduit_core::HttpError;
use http::StatusCode;
use thiserror::Error;

/// Classified failure of a single provider call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// No response within the per-provider timeout
    #[error("timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// 5xx from the provider
    #[error("provider returned {status}")]
    Transient { status: u16 },

    /// Connection refused, reset, or similar
    #[error("network error: {0}")]
    Network(String),

    /// 429 from the provider
    #[error("rate limited by provider")]
    RateLimited,

    /// 401 or 403 from the provider
    #[error("provider rejected credentials ({status})")]
    Auth { status: u16 },

    /// Any other 4xx
    #[error("provider rejected the request ({status})")]
    BadRequest { status: u16 },

    /// Breaker open, no call was made
    #[error("circuit open for {provider}, retry in {}ms", retry_after.as_millis())]
    CircuitOpen { provider: String, retry_after: Duration },

    /// 2xx with a body that could not be decoded
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Worth retrying against the same model after a backoff
    pub const fn is_retryable_call(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Transient { .. } | Self::Network(_) | Self::RateLimited
        )
    }

    /// Worth moving on to the next candidate model
    pub const fn is_retryable_fallback(&self) -> bool {
        !matches!(self, Self::Auth { .. } | Self::BadRequest { .. })
    }

    /// Counts as a failure for the provider's circuit breaker
    pub const fn trips_breaker(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Transient { .. } | Self::Network(_) | Self::InvalidResponse(_)
        )
    }

    /// Short label for logs and metrics
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Transient { .. } => "transient",
            Self::Network(_) => "network",
            Self::RateLimited => "rate_limited",
            Self::Auth { .. } => "auth",
            Self::BadRequest { .. } => "bad_request",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// Errors surfaced to callers of the orchestrator
#[derive(Debug, Error)]
pub enum LlmError {
    /// Malformed input
    #[error("invalid request: {0}")]
    Validation(String),

    /// Model id unknown to the registry
    #[error("model not found: {model}")]
    ModelNotFound { model: String },

    /// Nothing to route to
    #[error("no models available")]
    NoModelsAvailable,

    /// A non-retryable provider failure aborted the try-list
    #[error("model {model} rejected the request: {source}")]
    Rejected {
        model: String,
        attempted: Vec<String>,
        source: ProviderError,
        request_id: String,
    },

    /// Every candidate was tried and failed
    #[error("all models failed after {}ms (attempted: {}): {last}", elapsed.as_millis(), attempted.join(", "))]
    AllModelsFailed {
        attempted: Vec<String>,
        last: ProviderError,
        elapsed: Duration,
        request_id: String,
    },

    /// The benchmark call itself failed
    #[error("benchmark of {model} failed: {source}")]
    BenchmarkFailed { model: String, source: ProviderError },

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LlmError {
    /// Request id carried by execution failures
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Rejected { request_id, .. } | Self::AllModelsFailed { request_id, .. } => Some(request_id.as_str()),
            _ => None,
        }
    }

    /// Models tried before the failure
    pub fn attempted(&self) -> &[String] {
        match self {
            Self::Rejected { attempted, .. } | Self::AllModelsFailed { attempted, .. } => attempted.as_slice(),
            _ => &[],
        }
    }
}

impl HttpError for LlmError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::ModelNotFound { .. } => StatusCode::NOT_FOUND,
            Self::NoModelsAvailable | Self::AllModelsFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Rejected { .. } | Self::BenchmarkFailed { .. } => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::ModelNotFound { .. } => "not_found_error",
            Self::NoModelsAvailable => "no_models_available",
            Self::Rejected { .. } => "provider_rejected",
            Self::AllModelsFailed { .. } => "all_models_failed",
            Self::BenchmarkFailed { .. } => "benchmark_failed",
            Self::Internal(_) => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Validation(_) | Self::ModelNotFound { .. } => self.to_string(),
            Self::NoModelsAvailable => "no models are available right now; try again later".to_owned(),
            Self::Rejected { model, source, .. } => {
                format!("model {model} rejected the request ({})", source.kind())
            }
            Self::AllModelsFailed { attempted, .. } => format!(
                "all models failed (attempted: {}); try again later or choose a different model",
                attempted.join(", ")
            ),
            Self::BenchmarkFailed { model, source } => {
                format!("benchmark of {model} failed ({})", source.kind())
            }
            Self::Internal(_) => "an internal error occurred".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_matrix() {
        let timeout = ProviderError::Timeout { after_ms: 10 };
        assert!(timeout.is_retryable_call() && timeout.is_retryable_fallback() && timeout.trips_breaker());

        let open = ProviderError::CircuitOpen {
            provider: "local".to_owned(),
            retry_after: Duration::from_secs(1),
        };
        assert!(!open.is_retryable_call());
        assert!(open.is_retryable_fallback());
        assert!(!open.trips_breaker());

        let bad = ProviderError::BadRequest { status: 400 };
        assert!(!bad.is_retryable_call() && !bad.is_retryable_fallback() && !bad.trips_breaker());

        let limited = ProviderError::RateLimited;
        assert!(limited.is_retryable_call());
        assert!(!limited.trips_breaker());
    }

    #[test]
    fn client_messages_hide_provider_details() {
        let error = LlmError::AllModelsFailed {
            attempted: vec!["a".to_owned(), "b".to_owned()],
            last: ProviderError::Network("connection reset by 10.0.0.7:443".to_owned()),
            elapsed: Duration::from_millis(1500),
            request_id: "req-1".to_owned(),
        };

        let message = error.client_message();
        assert!(message.contains("try again later or choose a different model"));
        assert!(message.contains("a, b"));
        assert!(!message.contains("10.0.0.7"));
        assert_eq!(error.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error.request_id(), Some("req-1"));
    }

    #[test]
    fn internal_errors_are_opaque() {
        let error = LlmError::Internal(anyhow::anyhow!("task panicked at src/executor.rs"));
        assert_eq!(error.client_message(), "an internal error occurred");
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
