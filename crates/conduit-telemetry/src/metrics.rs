//! Observability sink for routing and provider calls
//!
//! Instruments come from the global meter, so recording is a no-op until
//! [`crate::init`] installs an exporting meter provider.

use std::time::Duration;

use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use opentelemetry::KeyValue;

pub const API_CALLS: &str = "api_calls";
pub const API_ERRORS: &str = "api_errors";
pub const RATE_LIMIT_EXCEEDED: &str = "rate_limit_exceeded";
pub const FALLBACKS: &str = "fallbacks";
pub const CIRCUIT_OPEN: &str = "circuit_open";
pub const RESPONSE_TIME: &str = "response_time";
pub const TOKEN_USAGE: &str = "token_usage";
pub const MODEL_HEALTH_STATUS: &str = "model_health_status";
pub const MODEL_ERROR_RATE: &str = "model_error_rate";

/// Counters, histograms, and gauges recorded by the orchestrator
#[derive(Clone)]
pub struct Metrics {
    api_calls: Counter<u64>,
    api_errors: Counter<u64>,
    rate_limit_exceeded: Counter<u64>,
    fallbacks: Counter<u64>,
    circuit_open: Counter<u64>,
    response_time: Histogram<f64>,
    token_usage: Histogram<u64>,
    model_health_status: Gauge<f64>,
    model_error_rate: Gauge<f64>,
}

impl Metrics {
    /// Instruments from the global `conduit` meter
    pub fn new() -> Self {
        Self::from_meter(&global::meter("conduit"))
    }

    pub fn from_meter(meter: &Meter) -> Self {
        Self {
            api_calls: meter
                .u64_counter(API_CALLS)
                .with_description("Provider calls attempted")
                .build(),
            api_errors: meter
                .u64_counter(API_ERRORS)
                .with_description("Provider calls that failed")
                .build(),
            rate_limit_exceeded: meter
                .u64_counter(RATE_LIMIT_EXCEEDED)
                .with_description("Requests rejected by the rate limiter")
                .build(),
            fallbacks: meter
                .u64_counter(FALLBACKS)
                .with_description("Requests served by a model other than the requested one")
                .build(),
            circuit_open: meter
                .u64_counter(CIRCUIT_OPEN)
                .with_description("Calls short-circuited by an open breaker")
                .build(),
            response_time: meter
                .f64_histogram(RESPONSE_TIME)
                .with_unit("s")
                .with_description("Provider call latency")
                .build(),
            token_usage: meter
                .u64_histogram(TOKEN_USAGE)
                .with_description("Total tokens per successful call")
                .build(),
            model_health_status: meter
                .f64_gauge(MODEL_HEALTH_STATUS)
                .with_description("1 healthy, 0.5 degraded, 0 unhealthy, -1 unknown")
                .build(),
            model_error_rate: meter
                .f64_gauge(MODEL_ERROR_RATE)
                .with_description("Rolling error rate per model")
                .build(),
        }
    }

    /// One provider call, successful or not
    pub fn record_call(&self, provider: &str, model: &str, success: bool, latency: Duration) {
        let attributes = call_attributes(provider, model);
        self.api_calls.add(1, &attributes);
        self.response_time.record(latency.as_secs_f64(), &attributes);
        if !success {
            self.api_errors.add(1, &attributes);
        }
    }

    pub fn record_tokens(&self, provider: &str, model: &str, total_tokens: u32) {
        self.token_usage
            .record(u64::from(total_tokens), &call_attributes(provider, model));
    }

    pub fn record_fallback(&self, requested: &str, used: &str) {
        self.fallbacks.add(
            1,
            &[
                KeyValue::new("requested_model", requested.to_owned()),
                KeyValue::new("model", used.to_owned()),
            ],
        );
    }

    pub fn record_circuit_open(&self, provider: &str) {
        self.circuit_open
            .add(1, &[KeyValue::new("provider", provider.to_owned())]);
    }

    /// `scope` is `global` or `per_ip`
    pub fn record_rate_limited(&self, scope: &'static str) {
        self.rate_limit_exceeded.add(1, &[KeyValue::new("scope", scope)]);
    }

    pub fn record_model_health(&self, provider: &str, model: &str, status: f64, error_rate: f64) {
        let attributes = call_attributes(provider, model);
        self.model_health_status.record(status, &attributes);
        self.model_error_rate.record(error_rate, &attributes);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn call_attributes(provider: &str, model: &str) -> [KeyValue; 2] {
    [
        KeyValue::new("provider", provider.to_owned()),
        KeyValue::new("model", model.to_owned()),
    ]
}
