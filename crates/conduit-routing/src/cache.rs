//! Short-lived cache of ranked suggestions

use std::time::Duration;

use mini_moka::sync::Cache;

use crate::analysis::LengthBucket;
use crate::scoring::RankedSuggestion;

/// Every input a ranking depends on
///
/// The key holds the full values, so two requests share an entry only
/// when they are equal field by field. Candidates stay in caller order
/// because ties are broken by position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SuggestionKey {
    pub sample: String,
    pub category: String,
    pub bucket: LengthBucket,
    pub has_structured_error: bool,
    pub candidates: Vec<String>,
    pub user_id: Option<String>,
}

/// TTL-bounded suggestion cache
pub struct SuggestionCache {
    inner: Cache<SuggestionKey, RankedSuggestion>,
}

impl SuggestionCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder().max_capacity(capacity).time_to_live(ttl).build(),
        }
    }

    pub fn get(&self, key: &SuggestionKey) -> Option<RankedSuggestion> {
        self.inner.get(key)
    }

    pub fn insert(&self, key: SuggestionKey, suggestion: RankedSuggestion) {
        self.inner.insert(key, suggestion);
    }

    /// Drop every cached ranking
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}
