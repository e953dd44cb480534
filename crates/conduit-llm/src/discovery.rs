//! Background model discovery and health probing
//!
//! Each pass lists models from every provider and reconciles the
//! registry. A failed listing counts as a probe failure for the
//! provider's models instead of an absence, so an outage never makes
//! models stale.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use conduit_config::Config;
use conduit_routing::{ModelRegistration, ModelRegistry};
use conduit_telemetry::Metrics;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::executor::report_health;
use crate::provider::{Provider, ProviderMap};

/// Periodic listing of provider models
pub struct Discovery {
    providers: Arc<ProviderMap>,
    registry: Arc<ModelRegistry>,
    metrics: Metrics,
    /// Configured model ids per provider
    static_models: HashMap<String, Vec<String>>,
    interval: Duration,
}

impl Discovery {
    pub fn new(providers: Arc<ProviderMap>, registry: Arc<ModelRegistry>, metrics: Metrics, config: &Config) -> Self {
        let static_models = config
            .providers
            .iter()
            .map(|(name, provider)| (name.clone(), provider.models.clone()))
            .collect();

        Self {
            providers,
            registry,
            metrics,
            static_models,
            interval: Duration::from_secs(config.health.probe_interval_secs.max(1)),
        }
    }

    /// Register configured models so they are routable before any listing
    pub fn register_static(&self) {
        for (name, provider) in self.providers.iter() {
            for id in self.static_models.get(name).into_iter().flatten() {
                self.registry.register_or_update(registration(provider.as_ref(), id.clone()));
            }
        }
    }

    /// One discovery pass over every provider
    pub async fn refresh(&self) {
        for (name, provider) in self.providers.iter() {
            match provider.list_models().await {
                Ok(listed) => {
                    let mut ids: Vec<String> = listed.into_iter().map(|m| m.id).collect();
                    for id in self.static_models.get(name).into_iter().flatten() {
                        if !ids.contains(id) {
                            ids.push(id.clone());
                        }
                    }

                    tracing::debug!(provider = %name, count = ids.len(), "discovered models");

                    let registrations = ids
                        .into_iter()
                        .map(|id| registration(provider.as_ref(), id))
                        .collect();
                    self.registry.apply_listing(name, registrations);
                }
                Err(e) => {
                    tracing::warn!(provider = %name, error = %e, "failed to discover models");
                    self.registry.record_probe_failure(name);
                }
            }
        }

        for model in self.registry.all() {
            report_health(&self.registry, &self.metrics, &model.id);
        }
    }

    /// Refresh every probe interval until cancelled
    ///
    /// The first pass runs one interval from now; callers run the
    /// startup pass themselves.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + self.interval;
            let mut ticker = tokio::time::interval_at(start, self.interval);

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        tracing::debug!("model discovery stopped");
                        break;
                    }
                    _ = ticker.tick() => self.refresh().await,
                }
            }
        })
    }
}

fn registration(provider: &dyn Provider, id: String) -> ModelRegistration {
    ModelRegistration {
        id,
        provider_name: provider.name().to_owned(),
        provider: provider.kind(),
        endpoint: Some(provider.endpoint().to_owned()),
    }
}
