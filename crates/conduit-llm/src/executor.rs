//! Routing and fallback execution
//!
//! A request carries a try-list: the primary model followed by its
//! fallbacks. Candidates are tried strictly in order. Each candidate gets
//! its own retry budget through its provider's breaker before the next
//! one is considered. Auth and bad-request failures end the whole list,
//! since every other model would reject the same request.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use conduit_routing::{LengthBucket, ModelRegistry, Outcome, SuggestionRecord, SuggestionStore};
use conduit_telemetry::Metrics;
use jiff::Timestamp;
use tokio::time::Instant;

use crate::breaker::{BreakerRegistry, CircuitBreaker};
use crate::error::{LlmError, ProviderError};
use crate::provider::{Provider, ProviderMap};
use crate::retry::RetryPolicy;
use crate::types::{Completion, GenerationParams};

/// Suggestion that chose the primary model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionContext {
    pub suggested_model_id: String,
    pub category: String,
    pub content_length_bucket: LengthBucket,
    pub had_structured_error: bool,
    pub user_id: Option<String>,
}

/// Everything needed to run one request
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub primary: String,
    pub fallbacks: Vec<String>,
    pub prompt: String,
    pub params: GenerationParams,
    pub request_id: String,
    /// Present when the primary came from the scoring engine
    pub suggestion: Option<SuggestionContext>,
}

/// Successful execution
#[derive(Debug, Clone)]
pub struct Execution {
    pub completion: Completion,
    pub used_model_id: String,
    /// Models tried, in order, including the one that answered
    pub attempted: Vec<String>,
    pub fallback_used: bool,
    pub elapsed: Duration,
}

/// One model bound to its provider and breaker
pub(crate) struct Attempt {
    pub(crate) provider: Arc<dyn Provider>,
    pub(crate) breaker: Arc<CircuitBreaker>,
    pub(crate) registry: Arc<ModelRegistry>,
    pub(crate) metrics: Metrics,
    pub(crate) model_id: String,
}

impl Attempt {
    /// One call through the breaker, recorded into the registry
    pub(crate) async fn once(&self, prompt: &str, params: &GenerationParams) -> Result<Completion, ProviderError> {
        let started = Instant::now();
        let result = self
            .breaker
            .call(self.provider.timeout(), || {
                self.provider.invoke(&self.model_id, prompt, params)
            })
            .await;
        let latency = started.elapsed();
        let provider = self.provider.name();

        if let Err(ProviderError::CircuitOpen { .. }) = &result {
            self.metrics.record_circuit_open(provider);
            return result;
        }

        let failed = matches!(&result, Err(e) if e.trips_breaker());
        self.registry.observe(
            &self.model_id,
            Outcome {
                success: !failed,
                answered: result.is_ok(),
                latency,
                completion_tokens: result.as_ref().map_or(0, |c| c.usage.completion_tokens),
            },
        );

        self.metrics
            .record_call(provider, &self.model_id, result.is_ok(), latency);
        if let Ok(completion) = &result {
            self.metrics
                .record_tokens(provider, &self.model_id, completion.usage.total_tokens);
        }
        report_health(&self.registry, &self.metrics, &self.model_id);

        result
    }
}

/// Publish a model's health gauges
pub(crate) fn report_health(registry: &ModelRegistry, metrics: &Metrics, model_id: &str) {
    if let Some(model) = registry.get(model_id) {
        metrics.record_model_health(
            &model.provider_name,
            &model.id,
            model.status.gauge_value(),
            model.metrics.error_rate,
        );
    }
}

/// Executes try-lists against providers
pub struct Executor {
    providers: Arc<ProviderMap>,
    registry: Arc<ModelRegistry>,
    breakers: Arc<BreakerRegistry>,
    retry: RetryPolicy,
    history: Arc<dyn SuggestionStore>,
    metrics: Metrics,
}

impl Executor {
    pub fn new(
        providers: Arc<ProviderMap>,
        registry: Arc<ModelRegistry>,
        breakers: Arc<BreakerRegistry>,
        retry: RetryPolicy,
        history: Arc<dyn SuggestionStore>,
        metrics: Metrics,
    ) -> Self {
        Self {
            providers,
            registry,
            breakers,
            retry,
            history,
            metrics,
        }
    }

    /// Run the plan's try-list until a model answers
    ///
    /// Each attempt runs in its own task, so a caller that goes away
    /// abandons the wait but the outcome is still recorded.
    pub async fn execute(&self, plan: ExecutionPlan) -> Result<Execution, LlmError> {
        let started = Instant::now();
        let ExecutionPlan {
            primary,
            fallbacks,
            prompt,
            params,
            request_id,
            suggestion,
        } = plan;

        let prompt: Arc<str> = Arc::from(prompt);
        let params = Arc::new(params);
        let mut attempted = Vec::new();
        let mut last_error = None;

        for model_id in try_list(&primary, fallbacks) {
            let Some(attempt) = self.attempt_for(&model_id) else {
                tracing::warn!(model = %model_id, request_id = %request_id, "skipping candidate without a provider");
                continue;
            };

            attempted.push(model_id.clone());
            tracing::debug!(
                model = %model_id,
                provider = %attempt.provider.name(),
                request_id = %request_id,
                "trying candidate"
            );

            match self.run_detached(attempt, &prompt, &params).await? {
                Ok(completion) => {
                    let fallback_used = model_id != primary;
                    if fallback_used {
                        self.metrics.record_fallback(&primary, &model_id);
                        tracing::info!(
                            requested = %primary,
                            model = %model_id,
                            request_id = %request_id,
                            "served by fallback model"
                        );
                    }
                    self.record_suggestion(suggestion.as_ref(), &model_id, true).await;

                    return Ok(Execution {
                        completion,
                        used_model_id: model_id,
                        attempted,
                        fallback_used,
                        elapsed: started.elapsed(),
                    });
                }
                Err(e) if e.is_retryable_fallback() => {
                    tracing::warn!(
                        model = %model_id,
                        request_id = %request_id,
                        error = %e,
                        "candidate failed, moving to next model"
                    );
                    last_error = Some(e);
                }
                Err(e) => {
                    tracing::warn!(
                        model = %model_id,
                        request_id = %request_id,
                        error = %e,
                        "non-retryable failure, aborting try-list"
                    );
                    self.record_suggestion(suggestion.as_ref(), &model_id, false).await;

                    return Err(LlmError::Rejected {
                        model: model_id,
                        attempted,
                        source: e,
                        request_id,
                    });
                }
            }
        }

        let Some(last) = last_error else {
            return Err(LlmError::ModelNotFound { model: primary });
        };

        let selected = attempted.last().map_or(primary.as_str(), String::as_str);
        self.record_suggestion(suggestion.as_ref(), selected, false).await;

        Err(LlmError::AllModelsFailed {
            attempted,
            last,
            elapsed: started.elapsed(),
            request_id,
        })
    }

    /// Run one candidate's retry loop in its own task
    async fn run_detached(
        &self,
        attempt: Attempt,
        prompt: &Arc<str>,
        params: &Arc<GenerationParams>,
    ) -> Result<Result<Completion, ProviderError>, LlmError> {
        let retry = self.retry.clone();
        let prompt = Arc::clone(prompt);
        let params = Arc::clone(params);

        tokio::spawn(async move { retry.run(|| attempt.once(&prompt, &params)).await })
            .await
            .map_err(|e| LlmError::Internal(anyhow::anyhow!("provider attempt task failed: {e}")))
    }

    /// Bind a registered model to its provider
    pub(crate) fn attempt_for(&self, model_id: &str) -> Option<Attempt> {
        let model = self.registry.get(model_id)?;
        let provider = self.providers.get(&model.provider_name)?;

        Some(Attempt {
            provider: Arc::clone(provider),
            breaker: self.breakers.get(&model.provider_name),
            registry: Arc::clone(&self.registry),
            metrics: self.metrics.clone(),
            model_id: model.id,
        })
    }

    async fn record_suggestion(&self, context: Option<&SuggestionContext>, selected: &str, success: bool) {
        let Some(context) = context else {
            return;
        };

        let record = SuggestionRecord {
            timestamp: Timestamp::now(),
            suggested_model_id: context.suggested_model_id.clone(),
            selected_model_id: selected.to_owned(),
            was_accepted: success && selected == context.suggested_model_id,
            category: context.category.clone(),
            content_length_bucket: context.content_length_bucket,
            had_structured_error: context.had_structured_error,
            user_id: context.user_id.clone(),
        };

        if let Err(e) = self.history.append(record).await {
            tracing::warn!(error = %e, "failed to record suggestion outcome");
        }
    }
}

/// Primary then fallbacks, without blanks or repeats
fn try_list(primary: &str, fallbacks: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    std::iter::once(primary.to_owned())
        .chain(fallbacks)
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}
