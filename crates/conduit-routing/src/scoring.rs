//! Suggestion scoring engine
//!
//! Ranks candidate models for a content sample by a fixed linear
//! combination of five component scores:
//!
//! - **content**: content-feature weights scaled by per-family multipliers
//! - **modality**: analyzer scores dotted with the family affinity vector
//! - **historical**: share of similar accepted suggestions, per user or global
//! - **user preference**: decaying bonus over the user's accepted models
//! - **system health**: live status, error rate, and relative latency
//!
//! Scoring has no side effects besides the result cache, so a cache hit
//! and a fresh computation agree for the same key.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use conduit_config::{CombinationWeights, RetrainingConfig, ScoringConfig};
use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};

use crate::analysis::{self, ContentAnalysis, LengthBucket};
use crate::cache::{SuggestionCache, SuggestionKey};
use crate::error::RoutingError;
use crate::history::{PreferenceStore, RecordFilter, SuggestionStore, UserPreferences};
use crate::registry::{Model, ModelRegistry, ModelStatus};
use crate::weights::{ContentFeature, WeightStore, WeightTable};

/// Scores at or below this never win a ranking
pub const SCORE_SENTINEL: f64 = -1.0;

const USER_HISTORY_MIN_MATCHES: usize = 2;
const GLOBAL_HISTORY_MIN_MATCHES: usize = 3;
const USER_HISTORY_SCALE: f64 = 3.0;
const GLOBAL_HISTORY_SCALE: f64 = 2.5;

const PREFERENCE_TOP: f64 = 3.0;
const PREFERENCE_FLOOR: f64 = 1.0;
const TYPE_PREFERENCE_BONUS: f64 = 1.0;

const MAX_ERROR_PENALTY: f64 = 0.9;
const LATENCY_RATIO_MIN: f64 = 0.5;
const LATENCY_RATIO_MAX: f64 = 1.5;

const HIGH_CONFIDENCE_SCORE: f64 = 3.0;
const MEDIUM_CONFIDENCE_SCORE: f64 = 1.0;

/// Whether a provider is currently short-circuited
pub trait ProviderAvailability: Send + Sync {
    fn is_open(&self, provider_name: &str) -> bool;
}

/// Availability view for deployments without circuit breakers
pub struct AlwaysAvailable;

impl ProviderAvailability for AlwaysAvailable {
    fn is_open(&self, _provider_name: &str) -> bool {
        false
    }
}

/// Input to a suggestion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionRequest {
    pub content_sample: String,
    /// Content category, also accepted as `logType`
    #[serde(default, alias = "logType")]
    pub category: String,
    /// Full content length, defaults to the sample length
    #[serde(default)]
    pub content_length: Option<usize>,
    #[serde(default)]
    pub has_structured_error: bool,
    pub available_model_ids: Vec<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl SuggestionRequest {
    /// Length bucket of the full content
    pub fn length_bucket(&self) -> LengthBucket {
        analysis::length_bucket(
            self.content_length
                .unwrap_or_else(|| self.content_sample.chars().count()),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// How a suggestion was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionOutcome {
    Ranked,
    /// No candidates were supplied
    NoModelsAvailable,
    /// Nothing scored above the sentinel, first candidate returned
    Fallback,
}

/// Score breakdown for one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateScore {
    pub model_id: String,
    pub family: String,
    pub content: f64,
    pub modality: f64,
    pub historical: f64,
    pub user_preference: f64,
    pub system_health: f64,
    pub total: f64,
}

/// Ranked list of candidates for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedSuggestion {
    /// Top candidate, absent when no candidates were supplied
    pub suggested_model_id: Option<String>,
    /// Candidate ids, best first
    pub ordered_candidates: Vec<String>,
    pub confidence: Confidence,
    pub rationale: String,
    pub raw_score: f64,
    pub outcome: SuggestionOutcome,
    /// Breakdown in ranked order
    pub candidates: Vec<CandidateScore>,
}

impl RankedSuggestion {
    /// Structured result for an empty candidate list
    pub fn no_models() -> Self {
        Self {
            suggested_model_id: None,
            ordered_candidates: Vec::new(),
            confidence: Confidence::Low,
            rationale: "no models available".to_owned(),
            raw_score: 0.0,
            outcome: SuggestionOutcome::NoModelsAvailable,
            candidates: Vec::new(),
        }
    }
}

/// Engine tuning taken from configuration
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub combination: CombinationWeights,
    pub sample_limit: usize,
    /// Age limit of history consulted for patterns
    pub history_lookback: SignedDuration,
    pub history_limit: usize,
    pub cache_ttl: Duration,
    pub cache_capacity: u64,
}

impl EngineSettings {
    pub fn from_config(scoring: &ScoringConfig, retraining: &RetrainingConfig) -> Self {
        Self {
            combination: scoring.weights.clone(),
            sample_limit: scoring.sample_limit,
            history_lookback: SignedDuration::from_hours(24 * i64::from(retraining.lookback_days)),
            history_limit: retraining.max_records,
            cache_ttl: Duration::from_secs(scoring.cache_ttl_secs),
            cache_capacity: scoring.cache_capacity,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&ScoringConfig::default(), &RetrainingConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
enum PatternSource {
    User,
    Global,
}

/// Historical acceptance shares for one request shape
#[derive(Debug, Default)]
struct HistoricalPattern {
    scores: HashMap<String, f64>,
    source: Option<PatternSource>,
}

/// Ranks candidate models for content
pub struct SuggestionEngine {
    registry: Arc<ModelRegistry>,
    weights: WeightStore,
    history: Arc<dyn SuggestionStore>,
    preferences: Arc<dyn PreferenceStore>,
    availability: Arc<dyn ProviderAvailability>,
    cache: SuggestionCache,
    settings: EngineSettings,
}

impl SuggestionEngine {
    pub fn new(
        registry: Arc<ModelRegistry>,
        weights: WeightTable,
        history: Arc<dyn SuggestionStore>,
        preferences: Arc<dyn PreferenceStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            registry,
            weights: WeightStore::new(weights),
            history,
            preferences,
            availability: Arc::new(AlwaysAvailable),
            cache: SuggestionCache::new(settings.cache_capacity, settings.cache_ttl),
            settings,
        }
    }

    /// Use a breaker view when scoring system health
    #[must_use]
    pub fn with_availability(mut self, availability: Arc<dyn ProviderAvailability>) -> Self {
        self.availability = availability;
        self
    }

    /// Current weight table snapshot
    pub fn weights(&self) -> Arc<WeightTable> {
        self.weights.snapshot()
    }

    /// Replace the weight table and drop rankings made with the old one
    pub fn publish_weights(&self, table: WeightTable) -> Result<(), RoutingError> {
        self.weights.publish(table)?;
        self.cache.invalidate_all();
        Ok(())
    }

    pub fn invalidate_cache(&self) {
        self.cache.invalidate_all();
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Rank the request's candidates
    ///
    /// Never fails: an empty list yields the no-models result, and store
    /// failures only remove the history and preference signals.
    pub async fn suggest(&self, request: &SuggestionRequest) -> RankedSuggestion {
        let candidates = dedupe(&request.available_model_ids);
        if candidates.is_empty() {
            return RankedSuggestion::no_models();
        }

        let sample = analysis::truncate_sample(&request.content_sample, self.settings.sample_limit);
        let bucket = request.length_bucket();

        let key = SuggestionKey {
            sample: sample.to_owned(),
            category: request.category.clone(),
            bucket,
            has_structured_error: request.has_structured_error,
            candidates: candidates.clone(),
            user_id: request.user_id.clone(),
        };
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(top = ?hit.suggested_model_id, "suggestion cache hit");
            return hit;
        }

        let weights = self.weights.snapshot();
        let content = analysis::analyze_content(sample);
        let pattern = self.historical_pattern(request, bucket).await;
        let preferences = self.user_preferences(request.user_id.as_deref()).await;

        let models: Vec<Option<Model>> = candidates.iter().map(|id| self.registry.get(id)).collect();
        let mean_latency = mean_latency(models.iter().flatten());

        let scores = candidates
            .iter()
            .zip(&models)
            .map(|(id, model)| {
                let family = weights.family_of(id);
                let content_score = content_score(&weights, &family, &content, request.has_structured_error, bucket);
                let modality = content.scores.dot(&weights.affinity(&family));
                let historical = pattern.scores.get(id).copied().unwrap_or(0.0);
                let user_preference = preferences
                    .as_ref()
                    .map_or(0.0, |p| preference_score(p, id, &request.category));
                let system_health = model.as_ref().map_or(ModelStatus::Unknown.health_base(), |m| {
                    self.health_score(m, mean_latency)
                });

                let w = &self.settings.combination;
                let total = content_score * w.content
                    + modality * w.modality
                    + historical * w.historical
                    + user_preference * w.user_preference
                    + system_health * w.system_health;

                CandidateScore {
                    model_id: id.clone(),
                    family,
                    content: content_score,
                    modality,
                    historical,
                    user_preference,
                    system_health,
                    total,
                }
            })
            .collect();

        let suggestion = rank(scores, pattern.source);

        tracing::info!(
            top = ?suggestion.suggested_model_id,
            confidence = %suggestion.confidence,
            raw_score = suggestion.raw_score,
            candidates = suggestion.ordered_candidates.len(),
            "suggestion ranked"
        );

        self.cache.insert(key, suggestion.clone());
        suggestion
    }

    async fn historical_pattern(&self, request: &SuggestionRequest, bucket: LengthBucket) -> HistoricalPattern {
        let since = Timestamp::now().checked_sub(self.settings.history_lookback).ok();
        let filter = RecordFilter {
            since,
            category: Some(request.category.clone()),
            limit: Some(self.settings.history_limit),
            ..RecordFilter::default()
        };

        let records = match self.history.query(&filter).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "suggestion history unavailable, scoring without it");
                return HistoricalPattern::default();
            }
        };

        let similar: Vec<_> = records
            .iter()
            .filter(|r| {
                r.was_accepted
                    && r.content_length_bucket == bucket
                    && r.had_structured_error == request.has_structured_error
            })
            .collect();

        let user_matches: Vec<_> = request
            .user_id
            .as_deref()
            .map(|user| {
                similar
                    .iter()
                    .filter(|r| r.user_id.as_deref() == Some(user))
                    .copied()
                    .collect()
            })
            .unwrap_or_default();

        let (matches, scale, source) = if user_matches.len() >= USER_HISTORY_MIN_MATCHES {
            (user_matches, USER_HISTORY_SCALE, PatternSource::User)
        } else if similar.len() >= GLOBAL_HISTORY_MIN_MATCHES {
            (similar, GLOBAL_HISTORY_SCALE, PatternSource::Global)
        } else {
            return HistoricalPattern::default();
        };

        let mut counts: HashMap<String, usize> = HashMap::new();
        for record in &matches {
            *counts.entry(record.selected_model_id.clone()).or_default() += 1;
        }

        let total = matches.len() as f64;
        HistoricalPattern {
            scores: counts
                .into_iter()
                .map(|(id, count)| (id, scale * count as f64 / total))
                .collect(),
            source: Some(source),
        }
    }

    async fn user_preferences(&self, user_id: Option<&str>) -> Option<UserPreferences> {
        let user_id = user_id?;
        match self.preferences.get(user_id).await {
            Ok(preferences) => Some(preferences),
            Err(e) => {
                tracing::warn!(user = %user_id, error = %e, "user preferences unavailable");
                None
            }
        }
    }

    fn health_score(&self, model: &Model, mean_latency: Option<f64>) -> f64 {
        if self.availability.is_open(&model.provider_name) {
            return 0.0;
        }

        let base = model.status.health_base();
        let error_factor = 1.0 - model.metrics.error_rate.min(MAX_ERROR_PENALTY);
        let latency_factor = match (mean_latency, own_latency(model)) {
            (Some(mean), Some(own)) if own > 0.0 => (mean / own).clamp(LATENCY_RATIO_MIN, LATENCY_RATIO_MAX),
            _ => 1.0,
        };

        base * error_factor * latency_factor
    }
}

fn dedupe(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

fn content_score(
    weights: &WeightTable,
    family: &str,
    content: &ContentAnalysis,
    has_structured_error: bool,
    bucket: LengthBucket,
) -> f64 {
    let stack = if content.features.has_stack_trace || has_structured_error {
        1.0
    } else {
        0.0
    };

    [
        (ContentFeature::CodeSnippets, content.scores.code),
        (ContentFeature::ErrorMessages, content.scores.errors),
        (ContentFeature::JsonData, content.scores.structured),
        (ContentFeature::StackTraces, stack),
        (ContentFeature::ContentLength, bucket.scale()),
    ]
    .into_iter()
    .map(|(feature, intensity)| weights.content_weight(feature) * weights.multiplier(family, feature) * intensity)
    .sum()
}

/// Decaying bonus from 3.0 for the latest accepted model to 1.0 for the oldest
fn preference_score(preferences: &UserPreferences, model_id: &str, category: &str) -> f64 {
    let listed = preferences.preferred_model_ids.len();
    let position_score = preferences
        .preferred_model_ids
        .iter()
        .position(|id| id == model_id)
        .map_or(0.0, |index| {
            if listed <= 1 {
                PREFERENCE_TOP
            } else {
                PREFERENCE_TOP - (PREFERENCE_TOP - PREFERENCE_FLOOR) * index as f64 / (listed - 1) as f64
            }
        });

    let type_bonus = if preferences.type_preferences.get(category).map(String::as_str) == Some(model_id) {
        TYPE_PREFERENCE_BONUS
    } else {
        0.0
    };

    (position_score + type_bonus).min(PREFERENCE_TOP)
}

/// Observed latency, or the benchmark latency for unobserved models
fn own_latency(model: &Model) -> Option<f64> {
    if model.metrics.avg_response_time_secs > 0.0 {
        Some(model.metrics.avg_response_time_secs)
    } else {
        model
            .last_benchmark
            .as_ref()
            .map(|b| b.latency_secs)
            .filter(|l| *l > 0.0)
    }
}

fn mean_latency<'a>(models: impl Iterator<Item = &'a Model>) -> Option<f64> {
    let latencies: Vec<f64> = models.filter_map(own_latency).collect();
    if latencies.is_empty() {
        None
    } else {
        Some(latencies.iter().sum::<f64>() / latencies.len() as f64)
    }
}

fn rank(mut scores: Vec<CandidateScore>, source: Option<PatternSource>) -> RankedSuggestion {
    let caller_order: Vec<String> = scores.iter().map(|s| s.model_id.clone()).collect();

    for score in &mut scores {
        if !score.total.is_finite() {
            score.total = SCORE_SENTINEL;
        }
    }

    if scores.iter().all(|s| s.total <= SCORE_SENTINEL) {
        return RankedSuggestion {
            suggested_model_id: caller_order.first().cloned(),
            raw_score: scores.first().map_or(0.0, |s| s.total),
            ordered_candidates: caller_order,
            confidence: Confidence::Low,
            rationale: "fallback".to_owned(),
            outcome: SuggestionOutcome::Fallback,
            candidates: scores,
        };
    }

    // sort_by is stable, so equal scores keep caller order
    scores.sort_by(|a, b| b.total.total_cmp(&a.total));

    let top = &scores[0];
    let max_historical = scores.iter().map(|s| s.historical).fold(0.0, f64::max);
    let history_drove = source.is_some() && top.historical > 0.0 && top.historical >= max_historical;

    let confidence = if history_drove || top.total > HIGH_CONFIDENCE_SCORE {
        Confidence::High
    } else if top.total > MEDIUM_CONFIDENCE_SCORE {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    let mut rationale = format!(
        "{} ranked first of {}: content {:.2}, modality {:.2}, history {:.2}, preference {:.2}, health {:.2}",
        top.model_id,
        scores.len(),
        top.content,
        top.modality,
        top.historical,
        top.user_preference,
        top.system_health,
    );
    if history_drove && let Some(source) = source {
        rationale.push_str(&format!("; driven by {source} history"));
    }

    RankedSuggestion {
        suggested_model_id: Some(top.model_id.clone()),
        raw_score: top.total,
        ordered_candidates: scores.iter().map(|s| s.model_id.clone()).collect(),
        confidence,
        rationale,
        outcome: SuggestionOutcome::Ranked,
        candidates: scores,
    }
}

#[cfg(test)]
mod tests {
    use conduit_config::HealthPolicyConfig;
    use conduit_core::ProviderKind;

    use super::*;
    use crate::analysis::ModalityScores;
    use crate::history::{MemoryStore, SuggestionRecord};
    use crate::registry::{ModelRegistration, PartialMetrics};

    struct OpenFor(&'static str);

    impl ProviderAvailability for OpenFor {
        fn is_open(&self, provider_name: &str) -> bool {
            provider_name == self.0
        }
    }

    struct Fixture {
        registry: Arc<ModelRegistry>,
        store: Arc<MemoryStore>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: Arc::new(ModelRegistry::new(HealthPolicyConfig::default())),
                store: Arc::new(MemoryStore::new()),
            }
        }

        fn register(&self, id: &str, provider: &str) {
            self.registry.register_or_update(ModelRegistration {
                id: id.to_owned(),
                provider_name: provider.to_owned(),
                provider: ProviderKind::LocalInference,
                endpoint: None,
            });
        }

        fn engine(&self) -> SuggestionEngine {
            SuggestionEngine::new(
                Arc::clone(&self.registry),
                WeightTable::from_config(&ScoringConfig::default()),
                self.store.clone(),
                self.store.clone(),
                EngineSettings::default(),
            )
        }

        async fn accepted(&self, user: Option<&str>, model: &str, category: &str) {
            self.store
                .append(SuggestionRecord {
                    timestamp: Timestamp::now(),
                    suggested_model_id: model.to_owned(),
                    selected_model_id: model.to_owned(),
                    was_accepted: true,
                    category: category.to_owned(),
                    content_length_bucket: LengthBucket::Xs,
                    had_structured_error: false,
                    user_id: user.map(str::to_owned),
                })
                .await
                .unwrap();
        }
    }

    fn request(sample: &str, category: &str, candidates: &[&str]) -> SuggestionRequest {
        SuggestionRequest {
            content_sample: sample.to_owned(),
            category: category.to_owned(),
            available_model_ids: candidates.iter().map(|c| (*c).to_owned()).collect(),
            ..SuggestionRequest::default()
        }
    }

    #[tokio::test]
    async fn empty_candidates_yield_no_models_result() {
        let engine = Fixture::new().engine();
        let suggestion = engine.suggest(&request("anything", "text", &[])).await;

        assert_eq!(suggestion.outcome, SuggestionOutcome::NoModelsAvailable);
        assert_eq!(suggestion.suggested_model_id, None);
        assert!(suggestion.ordered_candidates.is_empty());
    }

    #[tokio::test]
    async fn code_content_prefers_code_family() {
        let engine = Fixture::new().engine();
        let suggestion = engine
            .suggest(&request("```def foo(): pass```", "error", &["llama2", "gpt-4"]))
            .await;

        assert_eq!(suggestion.ordered_candidates, ["gpt-4", "llama2"]);
        for candidate in &suggestion.candidates {
            assert!(candidate.content > 0.0);
        }
        let gpt = &suggestion.candidates[0];
        let llama = &suggestion.candidates[1];
        assert!(gpt.content > llama.content);
        assert!(gpt.modality > llama.modality);
    }

    #[tokio::test]
    async fn ranking_is_deterministic() {
        let fixture = Fixture::new();
        let req = request("{\"a\": [1, 2]} failed with error", "data", &["mistral", "claude-3", "llama2"]);

        let first = fixture.engine().suggest(&req).await;
        let second = fixture.engine().suggest(&req).await;

        assert_eq!(first.ordered_candidates, second.ordered_candidates);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn ties_keep_caller_order() {
        let engine = Fixture::new().engine();
        let suggestion = engine
            .suggest(&request("summarize this", "text", &["beta", "alpha", "beta"]))
            .await;

        assert_eq!(suggestion.ordered_candidates, ["beta", "alpha"]);
        assert_eq!(suggestion.suggested_model_id.as_deref(), Some("beta"));
    }

    #[tokio::test]
    async fn unhealthy_model_behind_open_breaker_ranks_last() {
        let fixture = Fixture::new();
        fixture.register("model-x", "flaky");
        fixture.register("model-y", "stable");
        fixture.registry.update_health(
            "model-x",
            PartialMetrics {
                error_rate: Some(0.5),
                ..PartialMetrics::default()
            },
        );
        fixture.registry.update_health(
            "model-y",
            PartialMetrics {
                error_rate: Some(0.0),
                ..PartialMetrics::default()
            },
        );

        let engine = fixture.engine().with_availability(Arc::new(OpenFor("flaky")));
        let suggestion = engine
            .suggest(&request("hello", "text", &["model-x", "model-y"]))
            .await;

        assert_eq!(suggestion.ordered_candidates, ["model-y", "model-x"]);
        let x = &suggestion.candidates[1];
        assert!(x.system_health.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn faster_model_gets_better_health() {
        let fixture = Fixture::new();
        fixture.register("fast", "local");
        fixture.register("slow", "local");
        fixture.registry.update_health(
            "fast",
            PartialMetrics {
                avg_response_time_secs: Some(1.0),
                error_rate: Some(0.0),
                ..PartialMetrics::default()
            },
        );
        fixture.registry.update_health(
            "slow",
            PartialMetrics {
                avg_response_time_secs: Some(3.0),
                error_rate: Some(0.0),
                ..PartialMetrics::default()
            },
        );

        let suggestion = fixture
            .engine()
            .suggest(&request("hello", "text", &["slow", "fast"]))
            .await;

        assert_eq!(suggestion.ordered_candidates, ["fast", "slow"]);
        // mean latency 2.0: fast gets the 1.5 cap, slow 2/3
        assert!((suggestion.candidates[0].system_health - 1.5).abs() < 1e-9);
        assert!((suggestion.candidates[1].system_health - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn user_history_drives_the_pick() {
        let fixture = Fixture::new();
        fixture.accepted(Some("u1"), "mistral", "text").await;
        fixture.accepted(Some("u1"), "mistral", "text").await;

        let mut req = request("short note", "text", &["gpt-4", "mistral"]);
        req.user_id = Some("u1".to_owned());
        let suggestion = fixture.engine().suggest(&req).await;

        assert_eq!(suggestion.suggested_model_id.as_deref(), Some("mistral"));
        assert_eq!(suggestion.confidence, Confidence::High);
        assert!((suggestion.candidates[0].historical - 3.0).abs() < 1e-9);
        assert!(suggestion.rationale.contains("user history"));
    }

    #[tokio::test]
    async fn cached_ranking_holds_until_invalidated() {
        let fixture = Fixture::new();
        let engine = fixture.engine();
        let mut req = request("short note", "text", &["gpt-4", "mistral"]);
        req.user_id = Some("u1".to_owned());

        assert_eq!(engine.suggest(&req).await.suggested_model_id.as_deref(), Some("gpt-4"));

        fixture.accepted(Some("u1"), "mistral", "text").await;
        fixture.accepted(Some("u1"), "mistral", "text").await;
        assert_eq!(engine.suggest(&req).await.suggested_model_id.as_deref(), Some("gpt-4"));

        engine.invalidate_cache();
        assert_eq!(engine.suggest(&req).await.suggested_model_id.as_deref(), Some("mistral"));
    }

    #[tokio::test]
    async fn single_user_match_is_not_enough() {
        let fixture = Fixture::new();
        fixture.accepted(Some("u1"), "mistral", "text").await;

        let mut req = request("short note", "text", &["gpt-4", "mistral"]);
        req.user_id = Some("u1".to_owned());
        let suggestion = fixture.engine().suggest(&req).await;

        assert!(suggestion.candidates.iter().all(|c| c.historical.abs() < f64::EPSILON));
    }

    #[tokio::test]
    async fn global_history_needs_three_matches() {
        let fixture = Fixture::new();
        for user in ["a", "b", "c"] {
            fixture.accepted(Some(user), "llama2", "text").await;
        }
        fixture.accepted(None, "llama2", "code").await;

        let suggestion = fixture
            .engine()
            .suggest(&request("short note", "text", &["gpt-4", "llama2"]))
            .await;

        let llama = suggestion
            .candidates
            .iter()
            .find(|c| c.model_id == "llama2")
            .unwrap();
        assert!((llama.historical - 2.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn preferred_models_decay_by_position() {
        let fixture = Fixture::new();
        fixture
            .store
            .save(
                "u1",
                UserPreferences {
                    preferred_model_ids: vec!["c".to_owned(), "b".to_owned(), "a".to_owned()],
                    ..UserPreferences::default()
                },
            )
            .await
            .unwrap();

        let mut req = request("hi", "text", &["a", "b", "c"]);
        req.user_id = Some("u1".to_owned());
        let suggestion = fixture.engine().suggest(&req).await;

        assert_eq!(suggestion.ordered_candidates, ["c", "b", "a"]);
        let prefs: Vec<f64> = suggestion.candidates.iter().map(|c| c.user_preference).collect();
        assert!((prefs[0] - 3.0).abs() < 1e-9);
        assert!((prefs[1] - 2.0).abs() < 1e-9);
        assert!((prefs[2] - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn publishing_weights_invalidates_cached_rankings() {
        let engine = Fixture::new().engine();
        let req = request("```fn main() {}```", "code", &["alpha", "beta"]);
        assert_eq!(engine.suggest(&req).await.ordered_candidates, ["alpha", "beta"]);

        let mut table = (*engine.weights()).clone();
        table.modality_affinities.insert(
            "beta".to_owned(),
            ModalityScores {
                code: 5.0,
                ..ModalityScores::NEUTRAL
            },
        );
        engine.publish_weights(table).unwrap();

        assert_eq!(engine.suggest(&req).await.ordered_candidates, ["beta", "alpha"]);
    }

    #[test]
    fn non_finite_scores_fall_back_to_first_candidate() {
        let score = |id: &str| CandidateScore {
            model_id: id.to_owned(),
            family: id.to_owned(),
            content: f64::NAN,
            modality: 0.0,
            historical: 0.0,
            user_preference: 0.0,
            system_health: 0.0,
            total: f64::NAN,
        };

        let suggestion = rank(vec![score("first"), score("second")], None);

        assert_eq!(suggestion.outcome, SuggestionOutcome::Fallback);
        assert_eq!(suggestion.suggested_model_id.as_deref(), Some("first"));
        assert_eq!(suggestion.confidence, Confidence::Low);
        assert_eq!(suggestion.rationale, "fallback");
    }

    #[test]
    fn confidence_follows_raw_score() {
        let score = |total: f64| CandidateScore {
            model_id: "m".to_owned(),
            family: "m".to_owned(),
            content: 0.0,
            modality: 0.0,
            historical: 0.0,
            user_preference: 0.0,
            system_health: 0.0,
            total,
        };

        assert_eq!(rank(vec![score(0.5)], None).confidence, Confidence::Low);
        assert_eq!(rank(vec![score(1.5)], None).confidence, Confidence::Medium);
        assert_eq!(rank(vec![score(3.5)], None).confidence, Confidence::High);
    }
}
