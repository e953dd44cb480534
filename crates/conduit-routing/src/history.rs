//! Suggestion history and user preference collaborators
//!
//! Persistence is external. The engine and the retrainer only talk to the
//! [`SuggestionStore`] and [`PreferenceStore`] traits; [`MemoryStore`]
//! implements both for single-process deployments and tests.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use dashmap::DashMap;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::analysis::LengthBucket;
use crate::error::RoutingError;

/// Preferred models kept per user
const MAX_PREFERRED_MODELS: usize = 10;

/// Records kept by the in-memory store
const DEFAULT_MEMORY_CAPACITY: usize = 100_000;

/// One observed routing decision and its outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionRecord {
    #[serde(default = "Timestamp::now")]
    pub timestamp: Timestamp,
    pub suggested_model_id: String,
    pub selected_model_id: String,
    pub was_accepted: bool,
    /// Content category, also accepted as `logType`
    #[serde(alias = "logType")]
    pub category: String,
    pub content_length_bucket: LengthBucket,
    #[serde(default)]
    pub had_structured_error: bool,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Selection criteria for a history query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Only records at or after this instant
    pub since: Option<Timestamp>,
    pub user_id: Option<String>,
    pub category: Option<String>,
    /// Keep only the most recent `limit` matches
    pub limit: Option<usize>,
}

impl RecordFilter {
    fn matches(&self, record: &SuggestionRecord) -> bool {
        self.since.is_none_or(|since| record.timestamp >= since)
            && self
                .user_id
                .as_deref()
                .is_none_or(|user| record.user_id.as_deref() == Some(user))
            && self.category.as_deref().is_none_or(|c| record.category == c)
    }
}

/// Per-user model preferences
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    /// Most recently accepted first
    pub preferred_model_ids: Vec<String>,
    /// Preferred model per content category
    pub type_preferences: BTreeMap<String, String>,
}

impl UserPreferences {
    /// Move an accepted model to the front and remember it for the category
    pub fn accept(&mut self, model_id: &str, category: &str) {
        self.preferred_model_ids.retain(|id| id != model_id);
        self.preferred_model_ids.insert(0, model_id.to_owned());
        self.preferred_model_ids.truncate(MAX_PREFERRED_MODELS);
        self.type_preferences
            .insert(category.to_owned(), model_id.to_owned());
    }
}

/// Append-only history of suggestion outcomes
#[async_trait]
pub trait SuggestionStore: Send + Sync {
    async fn append(&self, record: SuggestionRecord) -> Result<(), RoutingError>;

    /// Matching records in chronological order
    async fn query(&self, filter: &RecordFilter) -> Result<Vec<SuggestionRecord>, RoutingError>;
}

/// Storage of per-user preferences
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Preferences of a user, empty for unknown users
    async fn get(&self, user_id: &str) -> Result<UserPreferences, RoutingError>;

    async fn save(&self, user_id: &str, preferences: UserPreferences) -> Result<(), RoutingError>;

    /// Apply an accepted selection to a user's preferences in one step
    async fn accept(&self, user_id: &str, model_id: &str, category: &str) -> Result<(), RoutingError>;
}

/// In-memory history and preference store
///
/// History is a bounded ring; the oldest records are dropped first.
pub struct MemoryStore {
    records: RwLock<VecDeque<SuggestionRecord>>,
    capacity: usize,
    preferences: DashMap<String, UserPreferences>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
            preferences: DashMap::new(),
        }
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SuggestionStore for MemoryStore {
    async fn append(&self, record: SuggestionRecord) -> Result<(), RoutingError> {
        let mut records = self.records.write().await;
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
        Ok(())
    }

    async fn query(&self, filter: &RecordFilter) -> Result<Vec<SuggestionRecord>, RoutingError> {
        let records = self.records.read().await;
        let mut matched: Vec<SuggestionRecord> = records.iter().filter(|r| filter.matches(r)).cloned().collect();

        if let Some(limit) = filter.limit
            && matched.len() > limit
        {
            matched.drain(..matched.len() - limit);
        }

        Ok(matched)
    }
}

#[async_trait]
impl PreferenceStore for MemoryStore {
    async fn get(&self, user_id: &str) -> Result<UserPreferences, RoutingError> {
        Ok(self
            .preferences
            .get(user_id)
            .map(|p| p.clone())
            .unwrap_or_default())
    }

    async fn save(&self, user_id: &str, preferences: UserPreferences) -> Result<(), RoutingError> {
        self.preferences.insert(user_id.to_owned(), preferences);
        Ok(())
    }

    async fn accept(&self, user_id: &str, model_id: &str, category: &str) -> Result<(), RoutingError> {
        self.preferences
            .entry(user_id.to_owned())
            .or_default()
            .accept(model_id, category);
        Ok(())
    }
}
