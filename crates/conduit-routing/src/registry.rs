//! Health and metrics registry of known models
//!
//! Models are created from provider listings and updated from passive
//! observation of executed calls, explicit health updates, and
//! benchmarks. The status is always derived from the metrics through the
//! configured thresholds; callers cannot set it directly.

use std::collections::VecDeque;
use std::time::Duration;

use conduit_config::HealthPolicyConfig;
use conduit_core::ProviderKind;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Derived health of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ModelStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl ModelStatus {
    /// Starting point of the system-health score
    pub const fn health_base(self) -> f64 {
        match self {
            Self::Healthy => 1.0,
            Self::Degraded => 0.7,
            Self::Unhealthy => 0.3,
            Self::Unknown => 0.5,
        }
    }

    /// Value reported on the `model_health_status` gauge
    pub const fn gauge_value(self) -> f64 {
        match self {
            Self::Healthy => 1.0,
            Self::Degraded => 0.5,
            Self::Unhealthy => 0.0,
            Self::Unknown => -1.0,
        }
    }
}

/// Rolling metrics of a model
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetrics {
    pub avg_response_time_secs: f64,
    pub throughput_tokens_per_sec: f64,
    /// Failed share of recent calls, within [0, 1]
    pub error_rate: f64,
}

/// Partial metrics update, unset fields are left unchanged
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PartialMetrics {
    pub avg_response_time_secs: Option<f64>,
    pub throughput_tokens_per_sec: Option<f64>,
    pub error_rate: Option<f64>,
}

/// Latest benchmark snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkResult {
    pub latency_secs: f64,
    pub tokens_per_sec: f64,
    pub estimated_cost: f64,
    pub total_tokens: u32,
    pub measured_at: Timestamp,
}

/// A registered inference target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: String,
    /// Name of the configured provider owning the model
    pub provider_name: String,
    pub provider: ProviderKind,
    pub endpoint: Option<String>,
    pub status: ModelStatus,
    pub metrics: ModelMetrics,
    pub last_benchmark: Option<BenchmarkResult>,
    pub last_updated: Timestamp,
    /// Absent from the last `stale_after_missed_refreshes` listings
    pub stale: bool,
    pub consecutive_probe_failures: u32,
    pub missed_refreshes: u32,
}

/// Identity of a model as reported by its provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRegistration {
    pub id: String,
    pub provider_name: String,
    pub provider: ProviderKind,
    pub endpoint: Option<String>,
}

/// Outcome of one executed provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Counts against the error rate when false
    pub success: bool,
    /// The provider returned a completion; only these feed latency and throughput
    pub answered: bool,
    pub latency: Duration,
    pub completion_tokens: u32,
}

/// Aggregate counts over the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    pub unknown: usize,
    pub stale: usize,
    /// Mean error rate over models with any signal
    pub avg_error_rate: f64,
}

struct Slot {
    model: Model,
    window: VecDeque<Outcome>,
    /// Any metrics have been observed or supplied
    has_signal: bool,
}

impl Slot {
    fn new(registration: ModelRegistration) -> Self {
        Self {
            model: Model {
                id: registration.id,
                provider_name: registration.provider_name,
                provider: registration.provider,
                endpoint: registration.endpoint,
                status: ModelStatus::Unknown,
                metrics: ModelMetrics::default(),
                last_benchmark: None,
                last_updated: Timestamp::now(),
                stale: false,
                consecutive_probe_failures: 0,
                missed_refreshes: 0,
            },
            window: VecDeque::new(),
            has_signal: false,
        }
    }

    fn refresh(&mut self, policy: &HealthPolicyConfig) {
        self.model.status = derive_status(&self.model, self.has_signal, policy);
        self.model.last_updated = Timestamp::now();
    }
}

/// Derive a status from metrics and probe state
///
/// Stale models are unknown. Otherwise the unhealthy rate wins over the
/// degraded rate and probe failures, and a model nobody has measured yet
/// stays unknown.
pub fn derive_status(model: &Model, has_signal: bool, policy: &HealthPolicyConfig) -> ModelStatus {
    let error_rate = model.metrics.error_rate;

    if model.stale {
        ModelStatus::Unknown
    } else if error_rate > policy.unhealthy_error_rate {
        ModelStatus::Unhealthy
    } else if error_rate > policy.degraded_error_rate
        || model.consecutive_probe_failures >= policy.probe_failure_threshold
    {
        ModelStatus::Degraded
    } else if !has_signal {
        ModelStatus::Unknown
    } else {
        ModelStatus::Healthy
    }
}

/// Concurrent directory of models keyed by id
pub struct ModelRegistry {
    models: DashMap<String, Slot>,
    policy: HealthPolicyConfig,
}

impl ModelRegistry {
    pub fn new(policy: HealthPolicyConfig) -> Self {
        Self {
            models: DashMap::new(),
            policy,
        }
    }

    /// Insert a model or merge a registration into an existing one
    ///
    /// Metrics, status, and benchmark are kept. An endpoint is only
    /// replaced when the registration carries one.
    pub fn register_or_update(&self, registration: ModelRegistration) {
        match self.models.entry(registration.id.clone()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                if slot.model.provider_name != registration.provider_name {
                    tracing::warn!(
                        model = %registration.id,
                        owner = %slot.model.provider_name,
                        provider = %registration.provider_name,
                        "model id already registered by another provider"
                    );
                    return;
                }
                slot.model.provider = registration.provider;
                if registration.endpoint.is_some() {
                    slot.model.endpoint = registration.endpoint;
                }
                slot.model.last_updated = Timestamp::now();
            }
            Entry::Vacant(vacant) => {
                tracing::debug!(model = %registration.id, provider = %registration.provider_name, "registering model");
                vacant.insert(Slot::new(registration));
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Model> {
        self.models.get(id).map(|slot| slot.model.clone())
    }

    /// Snapshot of all models ordered by id
    pub fn all(&self) -> Vec<Model> {
        let mut models: Vec<Model> = self.models.iter().map(|slot| slot.model.clone()).collect();
        models.sort_by(|a, b| a.id.cmp(&b.id));
        models
    }

    pub fn contains(&self, id: &str) -> bool {
        self.models.contains_key(id)
    }

    /// Apply a partial metrics update and re-derive the status
    pub fn update_health(&self, id: &str, update: PartialMetrics) {
        let Some(mut entry) = self.models.get_mut(id) else {
            tracing::debug!(model = %id, "health update for unknown model ignored");
            return;
        };

        let metrics = &mut entry.model.metrics;
        if let Some(avg) = update.avg_response_time_secs {
            metrics.avg_response_time_secs = avg.max(0.0);
        }
        if let Some(throughput) = update.throughput_tokens_per_sec {
            metrics.throughput_tokens_per_sec = throughput.max(0.0);
        }
        if let Some(rate) = update.error_rate {
            metrics.error_rate = rate.clamp(0.0, 1.0);
        }

        entry.has_signal = true;
        entry.refresh(&self.policy);
    }

    /// Store the latest benchmark snapshot
    pub fn record_benchmark(&self, id: &str, result: BenchmarkResult) {
        let Some(mut entry) = self.models.get_mut(id) else {
            tracing::debug!(model = %id, "benchmark for unknown model ignored");
            return;
        };

        entry.model.last_benchmark = Some(result);
        entry.has_signal = true;
        entry.refresh(&self.policy);
    }

    /// Record one executed call into the model's rolling window
    pub fn observe(&self, id: &str, outcome: Outcome) {
        let Some(mut entry) = self.models.get_mut(id) else {
            tracing::debug!(model = %id, "observation for unknown model ignored");
            return;
        };

        let entry = &mut *entry;
        entry.window.push_back(outcome);
        while entry.window.len() > self.policy.observation_window {
            entry.window.pop_front();
        }

        entry.model.metrics = window_metrics(&entry.window, entry.model.metrics);
        entry.has_signal = true;

        let previous = entry.model.status;
        entry.refresh(&self.policy);

        if previous != entry.model.status {
            tracing::info!(
                model = %entry.model.id,
                from = %previous,
                to = %entry.model.status,
                error_rate = entry.model.metrics.error_rate,
                "model status changed"
            );
        }
    }

    /// Reconcile a successful provider listing
    ///
    /// Listed models are upserted and lose any staleness. Models of the
    /// same provider missing from the listing count a missed refresh and
    /// turn stale once the configured number is reached. Nothing is
    /// removed.
    pub fn apply_listing(&self, provider_name: &str, listed: Vec<ModelRegistration>) {
        let listed_ids: Vec<String> = listed.iter().map(|r| r.id.clone()).collect();

        for registration in listed {
            self.register_or_update(registration);
        }

        for mut entry in self.models.iter_mut() {
            if entry.model.provider_name != provider_name {
                continue;
            }

            entry.model.consecutive_probe_failures = 0;

            if listed_ids.contains(&entry.model.id) {
                entry.model.missed_refreshes = 0;
                entry.model.stale = false;
            } else {
                entry.model.missed_refreshes = entry.model.missed_refreshes.saturating_add(1);
                if entry.model.missed_refreshes >= self.policy.stale_after_missed_refreshes && !entry.model.stale {
                    tracing::info!(model = %entry.model.id, provider = %provider_name, "model marked stale");
                    entry.model.stale = true;
                }
            }

            entry.refresh(&self.policy);
        }
    }

    /// Count a failed listing against every model of the provider
    pub fn record_probe_failure(&self, provider_name: &str) {
        for mut entry in self.models.iter_mut() {
            if entry.model.provider_name != provider_name {
                continue;
            }

            entry.model.consecutive_probe_failures = entry.model.consecutive_probe_failures.saturating_add(1);
            entry.refresh(&self.policy);
        }
    }

    pub fn status_summary(&self) -> StatusSummary {
        let mut summary = StatusSummary::default();
        let mut rate_total = 0.0;
        let mut measured = 0_u32;

        for entry in self.models.iter() {
            summary.total += 1;
            match entry.model.status {
                ModelStatus::Healthy => summary.healthy += 1,
                ModelStatus::Degraded => summary.degraded += 1,
                ModelStatus::Unhealthy => summary.unhealthy += 1,
                ModelStatus::Unknown => summary.unknown += 1,
            }
            if entry.model.stale {
                summary.stale += 1;
            }
            if entry.has_signal {
                rate_total += entry.model.metrics.error_rate;
                measured += 1;
            }
        }

        if measured > 0 {
            summary.avg_error_rate = rate_total / f64::from(measured);
        }

        summary
    }
}

fn window_metrics(window: &VecDeque<Outcome>, previous: ModelMetrics) -> ModelMetrics {
    let failures = window.iter().filter(|o| !o.success).count();
    let answered: Vec<&Outcome> = window.iter().filter(|o| o.answered).collect();

    let mut metrics = ModelMetrics {
        error_rate: if window.is_empty() {
            0.0
        } else {
            failures as f64 / window.len() as f64
        },
        ..previous
    };

    if !answered.is_empty() {
        let latency: f64 = answered.iter().map(|o| o.latency.as_secs_f64()).sum();
        let tokens: f64 = answered.iter().map(|o| f64::from(o.completion_tokens)).sum();

        metrics.avg_response_time_secs = latency / answered.len() as f64;
        if latency > 0.0 {
            metrics.throughput_tokens_per_sec = tokens / latency;
        }
    }

    metrics
}
