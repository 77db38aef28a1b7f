//! TTL cache of executed chart responses
//!
//! Keyed by `(dataset id, recommendation id, fingerprint)`. At most one entry
//! per key; the last write wins. Expired entries are dropped when read and by
//! [`ResultCache::purge_expired`].

pub mod fingerprint;

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::service::ChartExecutionResponse;

pub use fingerprint::fingerprint;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub dataset_id: String,
    pub recommendation_id: String,
    pub fingerprint: String,
}

impl CacheKey {
    pub fn new(
        dataset_id: impl Into<String>,
        recommendation_id: impl Into<String>,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            recommendation_id: recommendation_id.into(),
            fingerprint: fingerprint.into(),
        }
    }
}

struct CacheEntry {
    response: ChartExecutionResponse,
    cached_at: Instant,
}

/// Concurrent TTL cache of chart responses
pub struct ResultCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached response for `key`, marked as a cache hit
    pub fn get(&self, key: &CacheKey) -> Option<ChartExecutionResponse> {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(key) {
                Some(entry) if entry.cached_at.elapsed() < self.ttl => {
                    let mut response = entry.response.clone();
                    response.cache_hit = true;
                    return Some(response);
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: drop it unless a fresh write replaced it meanwhile
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries
            .get(key)
            .is_some_and(|entry| entry.cached_at.elapsed() >= self.ttl)
        {
            entries.remove(key);
            debug!(recommendation = %key.recommendation_id, "Evicted expired chart result");
        }
        None
    }

    pub fn set(&self, key: CacheKey, response: ChartExecutionResponse) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            key,
            CacheEntry {
                response,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.cached_at.elapsed() < self.ttl);
        before - entries.len()
    }

    /// Drop every entry of a dataset (e.g. after re-upload)
    pub fn invalidate_dataset(&self, dataset_id: &str) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|key, _| key.dataset_id != dataset_id);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
