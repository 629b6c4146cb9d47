//! Search configuration for the journey planner.

use std::time::Duration as StdDuration;

use crate::graph::SpeedTable;

/// Configuration parameters for journey search.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Maximum number of line changes when the caller doesn't specify one.
    pub max_transfers: usize,

    /// Number of destination arrivals to collect before stopping (K).
    pub max_results: usize,

    /// Cost added to edges whose transport type is not preferred (minutes).
    pub non_preferred_penalty_mins: u32,

    /// Speed assumed by the heuristic when the transport type is unknown (km/h).
    pub fallback_speed_kmh: f64,

    /// Node expansions after which the search gives up.
    pub max_expansions: usize,

    /// How long a search result stays cached (seconds).
    pub cache_ttl_secs: u64,

    /// Maximum number of cached search results.
    pub cache_capacity: u64,

    /// Average speed per transport type, shared by graph builder and heuristic.
    pub speeds: SpeedTable,
}

impl SearchConfig {
    /// Returns the cache TTL as a Duration.
    pub fn cache_ttl(&self) -> StdDuration {
        StdDuration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_transfers: 3,
            max_results: 3,
            non_preferred_penalty_mins: 5,
            fallback_speed_kmh: 20.0,
            max_expansions: 50_000,
            cache_ttl_secs: 300, // 5 minutes
            cache_capacity: 10_000,
            speeds: SpeedTable::default(),
        }
    }
}
