//! Active benchmarking of a single model

use conduit_routing::BenchmarkResult;
use jiff::Timestamp;
use tokio::time::Instant;

use crate::error::ProviderError;
use crate::executor::Attempt;
use crate::types::GenerationParams;

/// Fixed prompt so results stay comparable across models
pub const BENCHMARK_PROMPT: &str = "In one short paragraph, explain what a circuit breaker does in a distributed system.";

const BENCHMARK_MAX_TOKENS: u32 = 64;

/// Send the benchmark prompt once, without retries
///
/// The call goes through the provider's breaker and is recorded like
/// any other call before the snapshot is stored.
pub(crate) async fn run(attempt: &Attempt, cost_per_1k_tokens: f64) -> Result<BenchmarkResult, ProviderError> {
    let params = GenerationParams {
        temperature: Some(0.0),
        max_tokens: Some(BENCHMARK_MAX_TOKENS),
        ..GenerationParams::default()
    };

    let started = Instant::now();
    let completion = attempt.once(BENCHMARK_PROMPT, &params).await?;
    let latency_secs = started.elapsed().as_secs_f64();

    let usage = completion.usage;
    let result = BenchmarkResult {
        latency_secs,
        tokens_per_sec: if latency_secs > 0.0 {
            f64::from(usage.completion_tokens) / latency_secs
        } else {
            0.0
        },
        estimated_cost: estimated_cost(usage.total_tokens, cost_per_1k_tokens),
        total_tokens: usage.total_tokens,
        measured_at: Timestamp::now(),
    };

    tracing::info!(
        model = %attempt.model_id,
        latency_secs,
        tokens_per_sec = result.tokens_per_sec,
        "benchmark completed"
    );
    attempt.registry.record_benchmark(&attempt.model_id, result.clone());

    Ok(result)
}

fn estimated_cost(total_tokens: u32, cost_per_1k_tokens: f64) -> f64 {
    f64::from(total_tokens) / 1000.0 * cost_per_1k_tokens
}
