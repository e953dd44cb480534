//! Scoring weight table and its publication point
//!
//! The table is immutable once published. Retraining builds a modified
//! copy and swaps the shared pointer, so a scoring call always works on
//! one complete snapshot.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use conduit_config::{ContentMultipliers, ContentWeightsConfig, ScoringConfig};
use serde::{Deserialize, Serialize};

use crate::analysis::ModalityScores;
use crate::error::RoutingError;

/// Affinity entry used for families without their own vector
pub const DEFAULT_FAMILY: &str = "default";

/// Content feature carrying a tunable weight
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, strum::EnumIter, strum::Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ContentFeature {
    CodeSnippets,
    ErrorMessages,
    JsonData,
    StackTraces,
    ContentLength,
}

/// Mutable scoring configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightTable {
    /// Weight per content feature
    pub content_weights: BTreeMap<ContentFeature, f64>,
    /// Affinity vector per model family, with a `default` entry
    pub modality_affinities: BTreeMap<String, ModalityScores>,
    /// Static per-family multipliers on the content weights
    pub family_multipliers: BTreeMap<String, BTreeMap<ContentFeature, f64>>,
}

impl WeightTable {
    /// Build the hand-tuned starting table from configuration
    pub fn from_config(config: &ScoringConfig) -> Self {
        let mut modality_affinities = BTreeMap::from([(DEFAULT_FAMILY.to_owned(), ModalityScores::NEUTRAL)]);
        let mut family_multipliers = BTreeMap::new();

        for (name, family) in &config.families {
            let key = name.to_lowercase();
            let affinity = &family.affinity;
            modality_affinities.insert(
                key.clone(),
                ModalityScores {
                    text: affinity.text,
                    code: affinity.code,
                    structured: affinity.structured,
                    errors: affinity.errors,
                },
            );
            family_multipliers.insert(key, multipliers_from(&family.multipliers));
        }

        Self {
            content_weights: content_weights_from(&config.content_weights),
            modality_affinities,
            family_multipliers,
        }
    }

    /// Weight of a content feature, zero when absent
    pub fn content_weight(&self, feature: ContentFeature) -> f64 {
        self.content_weights.get(&feature).copied().unwrap_or(0.0)
    }

    /// Multiplier for a family and feature, neutral when absent
    pub fn multiplier(&self, family: &str, feature: ContentFeature) -> f64 {
        self.family_multipliers
            .get(family)
            .and_then(|m| m.get(&feature))
            .copied()
            .unwrap_or(1.0)
    }

    /// Affinity vector of a family, falling back to the default entry
    pub fn affinity(&self, family: &str) -> ModalityScores {
        self.modality_affinities
            .get(family)
            .or_else(|| self.modality_affinities.get(DEFAULT_FAMILY))
            .copied()
            .unwrap_or(ModalityScores::NEUTRAL)
    }

    /// Resolve the base family of a model id
    ///
    /// Lowercases, drops any `provider/` prefix and `:tag` suffix, then
    /// picks the longest known family that prefixes the name. Unknown
    /// models form their own family named after the base name.
    pub fn family_of(&self, model_id: &str) -> String {
        let lower = model_id.to_lowercase();
        let name = lower.rsplit('/').next().unwrap_or(&lower);
        let base = name.split(':').next().unwrap_or(name);

        self.modality_affinities
            .keys()
            .chain(self.family_multipliers.keys())
            .filter(|family| family.as_str() != DEFAULT_FAMILY && base.starts_with(family.as_str()))
            .max_by_key(|family| family.len())
            .map_or_else(|| base.to_owned(), Clone::clone)
    }

    /// Whether `family` has its own affinity or multiplier entry
    pub fn is_known_family(&self, family: &str) -> bool {
        family != DEFAULT_FAMILY
            && (self.modality_affinities.contains_key(family) || self.family_multipliers.contains_key(family))
    }

    /// Check that every weight is finite and non-negative
    pub fn validate(&self) -> Result<(), RoutingError> {
        for (feature, weight) in &self.content_weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(RoutingError::InvalidWeights(format!("content weight {feature} is {weight}")));
            }
        }

        for (family, affinity) in &self.modality_affinities {
            if !affinity.is_valid() {
                return Err(RoutingError::InvalidWeights(format!("affinity for family {family} is {affinity:?}")));
            }
        }

        for (family, multipliers) in &self.family_multipliers {
            if multipliers.values().any(|m| !m.is_finite() || *m < 0.0) {
                return Err(RoutingError::InvalidWeights(format!("multipliers for family {family}")));
            }
        }

        Ok(())
    }
}

fn content_weights_from(config: &ContentWeightsConfig) -> BTreeMap<ContentFeature, f64> {
    BTreeMap::from([
        (ContentFeature::CodeSnippets, config.code_snippets),
        (ContentFeature::ErrorMessages, config.error_messages),
        (ContentFeature::JsonData, config.json_data),
        (ContentFeature::StackTraces, config.stack_traces),
        (ContentFeature::ContentLength, config.content_length),
    ])
}

fn multipliers_from(config: &ContentMultipliers) -> BTreeMap<ContentFeature, f64> {
    BTreeMap::from([
        (ContentFeature::CodeSnippets, config.code_snippets),
        (ContentFeature::ErrorMessages, config.error_messages),
        (ContentFeature::JsonData, config.json_data),
        (ContentFeature::StackTraces, config.stack_traces),
        (ContentFeature::ContentLength, config.content_length),
    ])
}

/// Shared holder of the current weight table
///
/// Readers clone an `Arc` under a read lock held for a pointer copy;
/// the writer swaps in a whole new table.
#[derive(Debug)]
pub struct WeightStore {
    current: RwLock<Arc<WeightTable>>,
}

impl WeightStore {
    pub fn new(table: WeightTable) -> Self {
        Self {
            current: RwLock::new(Arc::new(table)),
        }
    }

    /// Current table snapshot
    pub fn snapshot(&self) -> Arc<WeightTable> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Validate and atomically replace the current table
    pub fn publish(&self, table: WeightTable) -> Result<(), RoutingError> {
        table.validate()?;

        let next = Arc::new(table);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next;

        Ok(())
    }
}
