//! Journey planning service: graph ownership, incident overlay and caching.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::config::SearchConfig;
use super::search::{Planner, SearchError, SearchOptions, SearchRequest, SearchResult};
use crate::cache::{CacheConfig, JourneyCache, SearchKey};
use crate::clock::Clock;
use crate::domain::{Stop, StopId};
use crate::geo::GeoPoint;
use crate::graph::{ReferenceData, TransitGraph};
use crate::incidents::IncidentOverlay;
use crate::store::DocumentStore;

/// Reference data and the graph built from it, swapped together.
struct Network {
    data: ReferenceData,
    graph: TransitGraph,
}

/// Answers journey queries against the current graph and live incidents.
pub struct JourneyService {
    network: RwLock<Arc<Network>>,
    store: Arc<dyn DocumentStore>,
    cache: JourneyCache,
    clock: Arc<dyn Clock>,
    config: SearchConfig,
}

impl JourneyService {
    pub fn new(
        data: ReferenceData,
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        config: SearchConfig,
    ) -> Self {
        let graph = data.build_graph(&config.speeds);
        Self {
            network: RwLock::new(Arc::new(Network { data, graph })),
            store,
            cache: JourneyCache::new(&CacheConfig::from(&config)),
            clock,
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    async fn network(&self) -> Arc<Network> {
        Arc::clone(&*self.network.read().await)
    }

    /// Up to K ranked journeys from `from` to `to`, departing at `departure`
    /// (now when `None`).
    ///
    /// Unreachable destinations produce an empty result with warnings rather
    /// than an error.
    pub async fn find_optimal_path(
        &self,
        from: &StopId,
        to: &StopId,
        departure: Option<DateTime<Utc>>,
        options: SearchOptions,
    ) -> Result<SearchResult, SearchError> {
        let departure = departure.unwrap_or_else(|| self.clock.now());
        let key = SearchKey::new(from, to, &options, &self.config);

        if let Some(hit) = self.cache.get(&key, departure).await {
            debug!(%from, %to, "journey cache hit");
            return Ok(hit);
        }

        let network = self.network().await;
        let incidents = self.store.active_incidents().await?;
        let overlay = IncidentOverlay::new(&incidents);
        let request = SearchRequest::new(from.clone(), to.clone(), departure).with_options(options);

        let result = Planner::new(&network.graph, &overlay, &self.config).search(&request)?;

        debug!(
            %from,
            %to,
            journeys = result.journeys.len(),
            expanded = result.nodes_expanded,
            incidents = incidents.len(),
            "journey search complete"
        );

        if !result.journeys.is_empty() {
            self.cache.insert(key, result.clone()).await;
        }
        Ok(result)
    }

    /// Closest stop to `point`, with its distance in metres.
    pub async fn nearest_stop(&self, point: &GeoPoint) -> Option<(Stop, f64)> {
        let network = self.network().await;
        network
            .data
            .nearest_stop(point)
            .map(|(stop, distance)| (stop.clone(), distance))
    }

    /// Replace the reference data and graph, dropping every cached result.
    pub async fn rebuild(&self, data: ReferenceData) {
        let graph = data.build_graph(&self.config.speeds);
        let (stops, edges) = (graph.stop_count(), graph.edge_count());
        *self.network.write().await = Arc::new(Network { data, graph });
        self.cache.invalidate_all();
        info!(stops, edges, "transit graph rebuilt");
    }

    pub async fn stop_count(&self) -> usize {
        self.network().await.graph.stop_count()
    }
}
