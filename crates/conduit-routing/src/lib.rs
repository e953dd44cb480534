//! Model suggestion and retraining for Conduit
//!
//! Ranks candidate models for a piece of content by combining heuristic
//! content analysis, per-family affinities, historical acceptance, user
//! preference, and live model health:
//! - **analysis**: stateless modality scoring of a content sample
//! - **registry**: concurrent model directory with derived health
//! - **scoring**: the suggestion engine and its result cache
//! - **feedback**: periodic retraining of the weight table from outcomes

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc, clippy::cast_precision_loss)]

pub mod analysis;
pub mod cache;
pub mod error;
pub mod feedback;
pub mod history;
pub mod registry;
pub mod scoring;
pub mod weights;

pub use analysis::{ContentAnalysis, ContentFeatures, LengthBucket, Modality, ModalityScores, analyze, analyze_content};
pub use error::RoutingError;
pub use feedback::{CycleOutcome, Retrainer};
pub use history::{MemoryStore, PreferenceStore, RecordFilter, SuggestionRecord, SuggestionStore, UserPreferences};
pub use registry::{
    BenchmarkResult, Model, ModelMetrics, ModelRegistration, ModelRegistry, ModelStatus, Outcome, PartialMetrics,
    StatusSummary,
};
pub use scoring::{
    AlwaysAvailable, CandidateScore, Confidence, EngineSettings, ProviderAvailability, RankedSuggestion,
    SuggestionEngine, SuggestionOutcome, SuggestionRequest,
};
pub use weights::{ContentFeature, WeightStore, WeightTable};
