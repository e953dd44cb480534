//! Scripted provider for unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use conduit_core::ProviderKind;

use crate::error::ProviderError;
use crate::provider::Provider;
use crate::types::{Completion, GenerationParams, ModelDescriptor, Usage};

/// Replays queued results per model, succeeding once a queue is empty
pub struct FakeProvider {
    name: String,
    listing: Mutex<Result<Vec<String>, ProviderError>>,
    scripts: Mutex<HashMap<String, VecDeque<Result<Completion, ProviderError>>>>,
    calls: Mutex<Vec<String>>,
    latency: Mutex<Duration>,
}

impl FakeProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            listing: Mutex::new(Ok(Vec::new())),
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            latency: Mutex::new(Duration::ZERO),
        }
    }

    /// Fail the next `times` calls to `model` with `error`
    pub fn fail(&self, model: &str, error: ProviderError, times: usize) {
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.entry(model.to_owned()).or_default();
        for _ in 0..times {
            queue.push_back(Err(error.clone()));
        }
    }

    /// Delay every later call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn set_listing(&self, listing: Result<Vec<&str>, ProviderError>) {
        *self.listing.lock().unwrap() = listing.map(|ids| ids.into_iter().map(str::to_owned).collect());
    }

    /// Calls made to `model`
    pub fn calls_to(&self, model: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|m| *m == model).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::HostedApi
    }

    fn endpoint(&self) -> &str {
        "http://fake.invalid"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, ProviderError> {
        self.listing
            .lock()
            .unwrap()
            .clone()
            .map(|ids| ids.into_iter().map(|id| ModelDescriptor { id }).collect())
    }

    async fn invoke(
        &self,
        model: &str,
        _prompt: &str,
        _params: &GenerationParams,
    ) -> Result<Completion, ProviderError> {
        self.calls.lock().unwrap().push(model.to_owned());

        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(model)
            .and_then(VecDeque::pop_front);

        scripted.unwrap_or_else(|| {
            Ok(Completion {
                text: format!("reply from {model}"),
                usage: Usage::new(10, 20),
            })
        })
    }
}
