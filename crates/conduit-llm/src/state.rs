//! Top-level orchestrator owning the registry, engine, and executor

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use conduit_config::Config;
use conduit_routing::{
    BenchmarkResult, EngineSettings, MemoryStore, Model, ModelRegistry, PreferenceStore, RankedSuggestion, Retrainer,
    SuggestionEngine, SuggestionRecord, SuggestionRequest, SuggestionStore, WeightTable, analyze_content,
};
use conduit_telemetry::Metrics;
use regex::Regex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::{BreakerStatus, ProcessRequest, ProcessResponse, ResponseMeta, SystemStatus};
use crate::benchmark;
use crate::breaker::BreakerRegistry;
use crate::discovery::Discovery;
use crate::error::LlmError;
use crate::executor::{ExecutionPlan, Executor, SuggestionContext};
use crate::provider::{self, ProviderMap};
use crate::retry::RetryPolicy;

/// Model id that asks the scoring engine to pick
pub const AUTO_MODEL: &str = "auto";

/// Category used when an auto-routed request names none
const DEFAULT_CATEGORY: &str = "general";

const MAX_REQUEST_ID_LEN: usize = 128;

static MODEL_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._:/@-]{0,127}$").unwrap());

/// Shared handle to the routing core
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<OrchestratorInner>,
}

struct OrchestratorInner {
    registry: Arc<ModelRegistry>,
    breakers: Arc<BreakerRegistry>,
    engine: Arc<SuggestionEngine>,
    executor: Executor,
    discovery: Arc<Discovery>,
    retrainer: Arc<Retrainer>,
    retraining_enabled: bool,
    history: Arc<dyn SuggestionStore>,
    preferences: Arc<dyn PreferenceStore>,
    costs: HashMap<String, f64>,
}

impl Orchestrator {
    /// Build with in-memory history and preferences
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        let store = Arc::new(MemoryStore::new());
        Self::with_stores(config, Arc::clone(&store) as Arc<dyn SuggestionStore>, store)
    }

    /// Build with external history and preference stores
    pub fn with_stores(
        config: &Config,
        history: Arc<dyn SuggestionStore>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Result<Self, LlmError> {
        let providers = Arc::new(provider::build_all(&config.providers));
        Self::with_providers(config, providers, history, preferences)
    }

    /// Build around already constructed providers
    pub fn with_providers(
        config: &Config,
        providers: Arc<ProviderMap>,
        history: Arc<dyn SuggestionStore>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Result<Self, LlmError> {
        let registry = Arc::new(ModelRegistry::new(config.health.clone()));
        let breakers = Arc::new(BreakerRegistry::new(config.circuit_breaker.clone()));
        let metrics = Metrics::new();

        let weights = WeightTable::from_config(&config.scoring);
        weights.validate().map_err(|e| LlmError::Internal(e.into()))?;

        let engine = Arc::new(
            SuggestionEngine::new(
                Arc::clone(&registry),
                weights.clone(),
                Arc::clone(&history),
                Arc::clone(&preferences),
                EngineSettings::from_config(&config.scoring, &config.retraining),
            )
            .with_availability(Arc::clone(&breakers) as Arc<dyn conduit_routing::ProviderAvailability>),
        );

        let retrainer = Arc::new(Retrainer::new(
            Arc::clone(&engine),
            Arc::clone(&history),
            weights,
            config.retraining.clone(),
        ));

        let executor = Executor::new(
            Arc::clone(&providers),
            Arc::clone(&registry),
            Arc::clone(&breakers),
            RetryPolicy::from_config(&config.retry),
            Arc::clone(&history),
            metrics.clone(),
        );

        let discovery = Arc::new(Discovery::new(providers, Arc::clone(&registry), metrics, config));
        discovery.register_static();

        let costs = config
            .providers
            .iter()
            .map(|(name, provider)| (name.clone(), provider.cost_per_1k_tokens))
            .collect();

        Ok(Self {
            inner: Arc::new(OrchestratorInner {
                registry,
                breakers,
                engine,
                executor,
                discovery,
                retrainer,
                retraining_enabled: config.retraining.enabled,
                history,
                preferences,
                costs,
            }),
        })
    }

    /// Spawn discovery and, when enabled, retraining
    pub fn start_background(&self, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = vec![Arc::clone(&self.inner.discovery).spawn(shutdown.clone())];
        if self.inner.retraining_enabled {
            handles.push(Arc::clone(&self.inner.retrainer).spawn(shutdown.clone()));
        }
        handles
    }

    /// Run one discovery pass now
    pub async fn discover(&self) {
        self.inner.discovery.refresh().await;
    }

    pub fn models(&self) -> Vec<Model> {
        self.inner.registry.all()
    }

    /// Registry snapshot with aggregate counts and breaker states
    pub fn status(&self) -> SystemStatus {
        SystemStatus {
            models: self.inner.registry.all(),
            summary: self.inner.registry.status_summary(),
            breakers: self
                .inner
                .breakers
                .states()
                .into_iter()
                .map(|(provider, state)| BreakerStatus { provider, state })
                .collect(),
        }
    }

    /// Rank the request's candidates
    pub async fn suggest(&self, request: &SuggestionRequest) -> Result<RankedSuggestion, LlmError> {
        for id in &request.available_model_ids {
            validate_model_id(id)?;
        }
        Ok(self.inner.engine.suggest(request).await)
    }

    /// Route a prompt through the try-list and return the first answer
    pub async fn process(&self, request: ProcessRequest) -> Result<ProcessResponse, LlmError> {
        let started = Instant::now();
        let request_id = request_id(request.request_id.as_deref())?;

        if request.prompt.trim().is_empty() {
            return Err(LlmError::Validation("prompt is required".to_owned()));
        }
        request.params.validate().map_err(LlmError::Validation)?;
        for id in &request.fallback_models {
            validate_model_id(id)?;
        }

        let (primary, fallbacks, suggestion) = if request.model_id == AUTO_MODEL {
            self.route_auto(&request, &request_id).await?
        } else {
            validate_model_id(&request.model_id)?;
            if !self.inner.registry.contains(&request.model_id) {
                return Err(LlmError::ModelNotFound {
                    model: request.model_id,
                });
            }
            (request.model_id, request.fallback_models, None)
        };

        let execution = self
            .inner
            .executor
            .execute(ExecutionPlan {
                primary: primary.clone(),
                fallbacks,
                prompt: request.prompt,
                params: request.params,
                request_id: request_id.clone(),
                suggestion,
            })
            .await?;

        tracing::info!(
            request_id = %request_id,
            model = %execution.used_model_id,
            fallback_used = execution.fallback_used,
            "request processed"
        );

        Ok(ProcessResponse {
            text: execution.completion.text,
            usage: execution.completion.usage,
            meta: ResponseMeta {
                request_id,
                model_id: execution.used_model_id,
                original_model_id: primary,
                fallback_used: execution.fallback_used,
                processing_time: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                attempted_models: execution.attempted,
            },
        })
    }

    /// Pick the primary and fallbacks with the scoring engine
    async fn route_auto(
        &self,
        request: &ProcessRequest,
        request_id: &str,
    ) -> Result<(String, Vec<String>, Option<SuggestionContext>), LlmError> {
        let candidates: Vec<String> = self
            .inner
            .registry
            .all()
            .into_iter()
            .filter(|m| !m.stale)
            .map(|m| m.id)
            .collect();
        if candidates.is_empty() {
            return Err(LlmError::NoModelsAvailable);
        }

        let suggestion_request = SuggestionRequest {
            content_sample: request.prompt.clone(),
            category: request
                .category
                .clone()
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_owned()),
            content_length: Some(request.prompt.chars().count()),
            has_structured_error: analyze_content(&request.prompt).features.has_stack_trace,
            available_model_ids: candidates,
            user_id: request.user_id.clone(),
        };

        let ranked = self.inner.engine.suggest(&suggestion_request).await;
        let Some(primary) = ranked.suggested_model_id.clone() else {
            return Err(LlmError::NoModelsAvailable);
        };

        tracing::info!(
            request_id,
            model = %primary,
            confidence = %ranked.confidence,
            score = ranked.raw_score,
            "auto routing selected model"
        );

        let fallbacks = if request.fallback_models.is_empty() {
            ranked
                .ordered_candidates
                .into_iter()
                .filter(|id| *id != primary)
                .collect()
        } else {
            request.fallback_models.clone()
        };

        let context = SuggestionContext {
            suggested_model_id: primary.clone(),
            content_length_bucket: suggestion_request.length_bucket(),
            had_structured_error: suggestion_request.has_structured_error,
            category: suggestion_request.category,
            user_id: suggestion_request.user_id,
        };

        Ok((primary, fallbacks, Some(context)))
    }

    /// Benchmark one model and store the snapshot
    pub async fn benchmark(&self, model_id: &str) -> Result<BenchmarkResult, LlmError> {
        validate_model_id(model_id)?;

        let model = self
            .inner
            .registry
            .get(model_id)
            .ok_or_else(|| LlmError::ModelNotFound {
                model: model_id.to_owned(),
            })?;

        let attempt = self
            .inner
            .executor
            .attempt_for(model_id)
            .ok_or_else(|| LlmError::Internal(anyhow::anyhow!("no provider named {}", model.provider_name)))?;

        let cost = self.inner.costs.get(&model.provider_name).copied().unwrap_or_default();

        benchmark::run(&attempt, cost)
            .await
            .map_err(|source| LlmError::BenchmarkFailed {
                model: model_id.to_owned(),
                source,
            })
    }

    /// Store explicit feedback and update the user's preferences
    pub async fn record_feedback(&self, record: SuggestionRecord) -> Result<(), LlmError> {
        validate_model_id(&record.suggested_model_id)?;
        validate_model_id(&record.selected_model_id)?;
        if record.category.trim().is_empty() {
            return Err(LlmError::Validation("category is required".to_owned()));
        }

        self.inner
            .history
            .append(record.clone())
            .await
            .map_err(|e| LlmError::Internal(e.into()))?;

        if record.was_accepted
            && let Some(user_id) = &record.user_id
        {
            self.inner
                .preferences
                .accept(user_id, &record.selected_model_id, &record.category)
                .await
                .map_err(|e| LlmError::Internal(e.into()))?;
        }

        tracing::debug!(
            suggested = %record.suggested_model_id,
            selected = %record.selected_model_id,
            accepted = record.was_accepted,
            "suggestion feedback recorded"
        );

        Ok(())
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.inner.registry
    }

    pub fn engine(&self) -> &Arc<SuggestionEngine> {
        &self.inner.engine
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.inner.breakers
    }

    pub fn retrainer(&self) -> &Arc<Retrainer> {
        &self.inner.retrainer
    }
}

fn validate_model_id(id: &str) -> Result<(), LlmError> {
    if MODEL_ID.is_match(id) {
        Ok(())
    } else {
        Err(LlmError::Validation(format!("invalid model id: {id:?}")))
    }
}

fn request_id(supplied: Option<&str>) -> Result<String, LlmError> {
    match supplied.map(str::trim) {
        Some(id) if id.len() > MAX_REQUEST_ID_LEN => Err(LlmError::Validation(format!(
            "requestId must be at most {MAX_REQUEST_ID_LEN} characters"
        ))),
        Some(id) if !id.is_empty() => Ok(id.to_owned()),
        _ => Ok(Uuid::new_v4().to_string()),
    }
}
