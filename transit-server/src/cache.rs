//! Caching layer for journey search results.
//!
//! Searches are cached per query shape (endpoints, transfer cap, incident
//! avoidance and preferred transport), not per departure time: a hit is
//! re-timed to the requested departure. Entries expire by TTL only, so an
//! incident published mid-window shows up in results at most one TTL late.
//! A graph rebuild drops everything.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache as MokaCache;

use crate::domain::{StopId, TransportType};
use crate::planner::{SearchConfig, SearchOptions, SearchResult};

/// What a cached search result depends on, besides the clock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchKey {
    pub from: StopId,
    pub to: StopId,
    pub max_transfers: usize,
    pub avoid_incidents: bool,
    pub preferred: BTreeSet<TransportType>,
}

impl SearchKey {
    /// Build the key, resolving the default transfer cap from `config`.
    pub fn new(from: &StopId, to: &StopId, options: &SearchOptions, config: &SearchConfig) -> Self {
        Self {
            from: from.clone(),
            to: to.clone(),
            max_transfers: options.max_transfers.unwrap_or(config.max_transfers),
            avoid_incidents: options.avoid_incidents,
            preferred: options.preferred_transport_types.clone(),
        }
    }
}

/// Configuration for the cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL for cached entries.
    pub ttl: Duration,

    /// Maximum number of cached entries.
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_capacity: 10_000,
        }
    }
}

impl From<&SearchConfig> for CacheConfig {
    fn from(config: &SearchConfig) -> Self {
        Self {
            ttl: config.cache_ttl(),
            max_capacity: config.cache_capacity,
        }
    }
}

/// Search results keyed by [`SearchKey`].
pub struct JourneyCache {
    results: MokaCache<SearchKey, Arc<SearchResult>>,
}

impl JourneyCache {
    /// Create a new cache with the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        let results = MokaCache::builder()
            .time_to_live(config.ttl)
            .max_capacity(config.max_capacity)
            .build();

        Self { results }
    }

    /// Cached result for `key`, with every journey shifted to `departure`.
    pub async fn get(&self, key: &SearchKey, departure: DateTime<Utc>) -> Option<SearchResult> {
        let cached = self.results.get(key).await?;
        let mut result = SearchResult::clone(&cached);
        result.journeys = cached
            .journeys
            .iter()
            .map(|j| j.retimed(departure))
            .collect();
        Some(result)
    }

    pub async fn insert(&self, key: SearchKey, result: SearchResult) {
        self.results.insert(key, Arc::new(result)).await;
    }

    /// Get cache statistics (for monitoring).
    pub fn entry_count(&self) -> u64 {
        self.results.entry_count()
    }

    /// Invalidate all cached entries.
    pub fn invalidate_all(&self) {
        self.results.invalidate_all();
    }
}
