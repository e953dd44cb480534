//! Provider access and resilient execution for Conduit
//!
//! Wraps local-inference and hosted-API backends behind one [`Provider`]
//! trait and runs requests through per-provider circuit breakers, bounded
//! retry, and ordered fallback. The [`Orchestrator`] ties this to the model
//! registry and the suggestion engine from `conduit-routing`, and
//! [`llm_router`] exposes it over HTTP.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc, clippy::cast_precision_loss)]

pub mod api;
mod benchmark;
pub mod breaker;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod provider;
pub mod retry;
#[cfg(feature = "http")]
pub mod router;
pub mod state;
pub mod types;

#[cfg(test)]
mod testing;

pub use api::{ProcessRequest, ProcessResponse, ResponseMeta, SystemStatus};
pub use benchmark::BENCHMARK_PROMPT;
pub use breaker::{BreakerRegistry, CircuitBreaker, CircuitState};
pub use error::{LlmError, ProviderError};
pub use provider::{Provider, ProviderMap};
pub use retry::RetryPolicy;
#[cfg(feature = "http")]
pub use router::llm_router;
pub use state::{AUTO_MODEL, Orchestrator};
pub use types::{Completion, GenerationParams, Usage};
