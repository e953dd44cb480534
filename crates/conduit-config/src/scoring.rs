use indexmap::IndexMap;
use serde::Deserialize;

/// Suggestion scoring configuration
///
/// These values seed the live weight table at startup. Retraining moves
/// the content weights and affinities afterwards; the combination
/// weights stay fixed for the lifetime of the process.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringConfig {
    /// Weights of the five score components
    pub weights: CombinationWeights,
    /// Hand-tuned weight per content feature
    pub content_weights: ContentWeightsConfig,
    /// Per-family multipliers and affinities keyed by family prefix.
    /// A table here replaces the built-in families.
    pub families: IndexMap<String, FamilyConfig>,
    /// Lifetime of a cached suggestion
    pub cache_ttl_secs: u64,
    /// Maximum cached suggestions
    pub cache_capacity: u64,
    /// Characters of content analyzed per request
    pub sample_limit: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: CombinationWeights::default(),
            content_weights: ContentWeightsConfig::default(),
            families: default_families(),
            cache_ttl_secs: 300,
            cache_capacity: 1_000,
            sample_limit: 4_000,
        }
    }
}

/// Linear combination weights, must sum to 1.0
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CombinationWeights {
    pub content: f64,
    pub modality: f64,
    pub historical: f64,
    pub user_preference: f64,
    pub system_health: f64,
}

impl CombinationWeights {
    /// Sum of all component weights
    pub fn total(&self) -> f64 {
        self.content + self.modality + self.historical + self.user_preference + self.system_health
    }
}

impl Default for CombinationWeights {
    fn default() -> Self {
        Self {
            content: 0.35,
            modality: 0.25,
            historical: 0.20,
            user_preference: 0.15,
            system_health: 0.05,
        }
    }
}

/// Starting weight for each content feature
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContentWeightsConfig {
    pub code_snippets: f64,
    pub error_messages: f64,
    pub json_data: f64,
    pub stack_traces: f64,
    pub content_length: f64,
}

impl Default for ContentWeightsConfig {
    fn default() -> Self {
        Self {
            code_snippets: 1.5,
            error_messages: 1.2,
            json_data: 1.0,
            stack_traces: 1.3,
            content_length: 0.5,
        }
    }
}

/// Static multipliers and starting affinities for one model family
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FamilyConfig {
    /// Multipliers on the content weights, 1.0 when omitted
    pub multipliers: ContentMultipliers,
    /// Starting modality affinity, 1.0 when omitted
    pub affinity: AffinityConfig,
}

/// Per-feature multiplier, neutral by default
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContentMultipliers {
    pub code_snippets: f64,
    pub error_messages: f64,
    pub json_data: f64,
    pub stack_traces: f64,
    pub content_length: f64,
}

impl Default for ContentMultipliers {
    fn default() -> Self {
        Self {
            code_snippets: 1.0,
            error_messages: 1.0,
            json_data: 1.0,
            stack_traces: 1.0,
            content_length: 1.0,
        }
    }
}

/// Affinity of a family for each content modality, neutral by default
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AffinityConfig {
    pub text: f64,
    pub code: f64,
    pub structured: f64,
    pub errors: f64,
}

impl Default for AffinityConfig {
    fn default() -> Self {
        Self {
            text: 1.0,
            code: 1.0,
            structured: 1.0,
            errors: 1.0,
        }
    }
}

fn family(multipliers: ContentMultipliers, affinity: [f64; 4]) -> FamilyConfig {
    let [text, code, structured, errors] = affinity;
    FamilyConfig {
        multipliers,
        affinity: AffinityConfig {
            text,
            code,
            structured,
            errors,
        },
    }
}

fn default_families() -> IndexMap<String, FamilyConfig> {
    let neutral = ContentMultipliers::default;
    let code_specialized = || ContentMultipliers {
        code_snippets: 1.2,
        stack_traces: 1.1,
        ..ContentMultipliers::default()
    };

    IndexMap::from([
        (
            "gpt-4".to_owned(),
            family(
                ContentMultipliers {
                    code_snippets: 1.2,
                    json_data: 1.1,
                    ..ContentMultipliers::default()
                },
                [1.1, 1.2, 1.2, 1.1],
            ),
        ),
        ("gpt-3.5".to_owned(), family(neutral(), [1.0, 0.9, 1.0, 0.9])),
        ("claude".to_owned(), family(neutral(), [1.2, 1.1, 1.1, 1.1])),
        ("codellama".to_owned(), family(code_specialized(), [0.8, 1.3, 1.0, 1.2])),
        ("llama2".to_owned(), family(neutral(), [1.0, 0.8, 0.8, 0.9])),
        ("mistral".to_owned(), family(neutral(), [1.0, 1.0, 0.9, 1.0])),
    ])
}
