//! Feedback-driven retraining of the weight table
//!
//! Each cycle reads recent suggestion outcomes and nudges the content
//! weights and family affinities toward what users accepted. Every
//! update is smoothed against the live table, and the result is
//! published as a new table; the live one is never edited in place.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use conduit_config::RetrainingConfig;
use jiff::{SignedDuration, Timestamp};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::analysis::{LengthBucket, Modality};
use crate::error::RoutingError;
use crate::history::{RecordFilter, SuggestionRecord, SuggestionStore};
use crate::scoring::SuggestionEngine;
use crate::weights::{ContentFeature, WeightTable};

/// Bounds of a freshly observed content weight
const OBSERVED_WEIGHT_MIN: f64 = 0.1;
const OBSERVED_WEIGHT_MAX: f64 = 5.0;

/// Bounds of a freshly observed affinity
const OBSERVED_AFFINITY_MIN: f64 = 0.5;
const OBSERVED_AFFINITY_MAX: f64 = 1.5;

/// Result of one retraining cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No records in the lookback window, weights untouched
    Skipped,
    /// Records existed but no group reached the sample minimum
    Unchanged { records: usize },
    /// A new table was published
    Published {
        records: usize,
        weights_updated: usize,
        affinities_updated: usize,
    },
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    total: usize,
    accepted: usize,
}

impl Tally {
    const fn add(&mut self, accepted: bool) {
        self.total += 1;
        if accepted {
            self.accepted += 1;
        }
    }

    fn rate(self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.accepted as f64 / self.total as f64
        }
    }
}

/// Periodic retrainer publishing through the scoring engine
pub struct Retrainer {
    engine: Arc<SuggestionEngine>,
    history: Arc<dyn SuggestionStore>,
    /// Hand-tuned starting table, the reference for observed weights
    baseline: WeightTable,
    config: RetrainingConfig,
}

impl Retrainer {
    pub fn new(
        engine: Arc<SuggestionEngine>,
        history: Arc<dyn SuggestionStore>,
        baseline: WeightTable,
        config: RetrainingConfig,
    ) -> Self {
        Self {
            engine,
            history,
            baseline,
            config,
        }
    }

    /// Run one retraining cycle
    ///
    /// Works on a copy of the current table and publishes it only after
    /// validation, so a failed cycle leaves the live table untouched.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, RoutingError> {
        let lookback = SignedDuration::from_hours(24 * i64::from(self.config.lookback_days));
        let filter = RecordFilter {
            since: Timestamp::now().checked_sub(lookback).ok(),
            limit: Some(self.config.max_records),
            ..RecordFilter::default()
        };

        let records = self.history.query(&filter).await?;
        if records.is_empty() {
            tracing::debug!("no suggestion records in lookback window, retraining skipped");
            return Ok(CycleOutcome::Skipped);
        }

        let current = self.engine.weights();
        let mut next = (*current).clone();

        let weights_updated = self.retrain_content_weights(&records, &mut next);
        let affinities_updated = self.retrain_affinities(&records, &current, &mut next);

        if weights_updated == 0 && affinities_updated == 0 {
            return Ok(CycleOutcome::Unchanged { records: records.len() });
        }

        self.engine.publish_weights(next)?;

        tracing::info!(
            records = records.len(),
            weights_updated,
            affinities_updated,
            "published retrained weight table"
        );

        Ok(CycleOutcome::Published {
            records: records.len(),
            weights_updated,
            affinities_updated,
        })
    }

    /// Spawn the periodic loop, first cycle after one interval
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let period = Duration::from_secs(self.config.interval_secs.max(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = self.run_cycle().await {
                            tracing::warn!(error = %e, "retraining cycle failed, keeping current weights");
                        }
                    }
                }
            }

            tracing::debug!("retraining loop stopped");
        })
    }

    fn retrain_content_weights(&self, records: &[SuggestionRecord], next: &mut WeightTable) -> usize {
        let mut overall = Tally::default();
        let mut by_feature: BTreeMap<ContentFeature, Tally> = BTreeMap::new();

        for record in records {
            overall.add(record.was_accepted);
            for feature in record_features(record) {
                by_feature.entry(feature).or_default().add(record.was_accepted);
            }
        }

        let overall_rate = overall.rate();
        if overall_rate <= 0.0 {
            return 0;
        }

        let alpha = self.config.smoothing;
        let mut updated = 0;

        for (feature, tally) in by_feature {
            if tally.total < self.config.min_samples {
                continue;
            }

            let baseline = self.baseline.content_weight(feature);
            let observed = (baseline * tally.rate() / overall_rate).clamp(OBSERVED_WEIGHT_MIN, OBSERVED_WEIGHT_MAX);
            let old = next.content_weight(feature);
            let new = smooth(alpha, old, observed);

            tracing::debug!(%feature, old, observed, new, samples = tally.total, "content weight retrained");
            next.content_weights.insert(feature, new);
            updated += 1;
        }

        updated
    }

    fn retrain_affinities(&self, records: &[SuggestionRecord], current: &WeightTable, next: &mut WeightTable) -> usize {
        let mut by_family: BTreeMap<(String, Modality), Tally> = BTreeMap::new();

        for record in records {
            // only configured families are retrained
            let family = current.family_of(&record.selected_model_id);
            if !current.is_known_family(&family) {
                continue;
            }
            for modality in record_modalities(record) {
                by_family
                    .entry((family.clone(), modality))
                    .or_default()
                    .add(record.was_accepted);
            }
        }

        let alpha = self.config.smoothing;
        let mut updated = 0;

        for ((family, modality), tally) in by_family {
            if tally.total < self.config.min_samples {
                continue;
            }

            let observed = (OBSERVED_AFFINITY_MIN + tally.rate()).clamp(OBSERVED_AFFINITY_MIN, OBSERVED_AFFINITY_MAX);
            let mut affinity = next.affinity(&family);
            let old = affinity.get(modality);
            *affinity.get_mut(modality) = smooth(alpha, old, observed);

            tracing::debug!(%family, %modality, old, observed, samples = tally.total, "affinity retrained");
            next.modality_affinities.insert(family, affinity);
            updated += 1;
        }

        updated
    }
}

/// `α·old + (1−α)·observed`
fn smooth(alpha: f64, old: f64, observed: f64) -> f64 {
    alpha.mul_add(old, (1.0 - alpha) * observed)
}

/// Content features a record carries, from its shape and category
fn record_features(record: &SuggestionRecord) -> Vec<ContentFeature> {
    let mut features = Vec::new();
    let category = record.category.to_lowercase();

    if is_code_category(&category) {
        features.push(ContentFeature::CodeSnippets);
    }
    if is_data_category(&category) {
        features.push(ContentFeature::JsonData);
    }
    if is_error_category(&category) {
        features.push(ContentFeature::ErrorMessages);
    }
    if record.had_structured_error {
        features.push(ContentFeature::StackTraces);
    }
    if matches!(record.content_length_bucket, LengthBucket::L | LengthBucket::Xl) {
        features.push(ContentFeature::ContentLength);
    }

    features
}

/// Modality axes a record speaks to, text when nothing else applies
fn record_modalities(record: &SuggestionRecord) -> Vec<Modality> {
    let category = record.category.to_lowercase();
    let mut modalities = Vec::new();

    if is_code_category(&category) {
        modalities.push(Modality::Code);
    }
    if is_data_category(&category) {
        modalities.push(Modality::Structured);
    }
    if is_error_category(&category) || record.had_structured_error {
        modalities.push(Modality::Errors);
    }
    if modalities.is_empty() {
        modalities.push(Modality::Text);
    }

    modalities
}

fn is_code_category(category: &str) -> bool {
    ["code", "debug", "compile"].iter().any(|k| category.contains(k))
}

fn is_data_category(category: &str) -> bool {
    ["json", "data", "struct", "table"].iter().any(|k| category.contains(k))
}

fn is_error_category(category: &str) -> bool {
    ["error", "exception", "crash", "fail"].iter().any(|k| category.contains(k))
}
