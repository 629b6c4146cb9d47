//! Multi-path A* journey search.
//!
//! Finds up to K ranked alternative journeys between two stops. Each search
//! label is a stop reached on a particular line, so the destination can be
//! popped once per arriving line; the search keeps going after the first
//! arrival until K arrivals are recorded or the frontier is exhausted.

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, trace};

use super::arena::{NodeArena, NodeIndex, PathNode, Via};
use super::config::SearchConfig;
use super::rank::rank_journeys;
use crate::domain::{Journey, LineId, Segment, Severity, StopId, TransportType};
use crate::error::ErrorKind;
use crate::graph::TransitGraph;
use crate::incidents::IncidentOverlay;
use crate::store::StoreError;

/// Error from journey search.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    /// Origin or destination is not a known stop
    #[error("stop not found: {0}")]
    StopNotFound(StopId),

    /// Invalid search request
    #[error("invalid search request: {0}")]
    InvalidRequest(String),

    /// Incidents could not be loaded
    #[error("failed to load incidents: {0}")]
    Store(#[from] StoreError),
}

impl SearchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SearchError::StopNotFound(_) => ErrorKind::NotFound,
            SearchError::InvalidRequest(_) => ErrorKind::InvalidInput,
            SearchError::Store(e) => e.kind(),
        }
    }
}

/// Caller-tunable search options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SearchOptions {
    /// Maximum number of line changes; the configured default when `None`.
    pub max_transfers: Option<usize>,

    /// Transport types the caller prefers. Empty means no preference.
    pub preferred_transport_types: BTreeSet<TransportType>,

    /// Refuse to travel over edges with a critical incident.
    pub avoid_incidents: bool,
}

/// Request for journey search.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub from: StopId,
    pub to: StopId,
    pub departure: DateTime<Utc>,
    pub options: SearchOptions,
}

impl SearchRequest {
    /// Create a new search request with default options.
    pub fn new(from: StopId, to: StopId, departure: DateTime<Utc>) -> Self {
        Self {
            from,
            to,
            departure,
            options: SearchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SearchOptions) -> Self {
        self.options = options;
        self
    }
}

/// Result of journey search.
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    /// Found journeys, ranked best-first.
    pub journeys: Vec<Journey>,

    /// More than one journey was found.
    pub alternative_available: bool,

    /// Number of nodes expanded during search.
    pub nodes_expanded: usize,

    /// Diagnostics for the caller (e.g. why nothing was found).
    pub warnings: Vec<String>,
}

impl SearchResult {
    /// Create an empty result carrying one warning.
    pub fn empty(warning: impl Into<String>) -> Self {
        Self {
            warnings: vec![warning.into()],
            ..Self::default()
        }
    }
}

/// Search key: a stop and the line used to reach it.
type Label = (StopId, Option<LineId>);

/// Open-set entry, ordered so the `BinaryHeap` pops the lowest f-score.
#[derive(Debug)]
struct OpenEntry {
    f_score: f64,
    g_score: u32,
    node: NodeIndex,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f_score
            .total_cmp(&self.f_score)
            .then_with(|| other.g_score.cmp(&self.g_score))
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

/// Journey planner over a prebuilt graph and an incident overlay.
pub struct Planner<'a> {
    graph: &'a TransitGraph,
    overlay: &'a IncidentOverlay<'a>,
    config: &'a SearchConfig,
}

impl<'a> Planner<'a> {
    /// Create a new planner.
    pub fn new(
        graph: &'a TransitGraph,
        overlay: &'a IncidentOverlay<'a>,
        config: &'a SearchConfig,
    ) -> Self {
        Self {
            graph,
            overlay,
            config,
        }
    }

    /// Search for up to K journeys from `request.from` to `request.to`.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResult, SearchError> {
        if self.graph.stop_count() == 0 {
            return Ok(SearchResult::empty("transit network is empty"));
        }
        for stop in [&request.from, &request.to] {
            if !self.graph.contains_stop(stop) {
                return Err(SearchError::StopNotFound(stop.clone()));
            }
        }
        if request.from == request.to {
            return Ok(SearchResult::empty("origin and destination are the same stop"));
        }

        let options = &request.options;
        let max_transfers = options.max_transfers.unwrap_or(self.config.max_transfers);
        let destination = &request.to;

        let mut arena = NodeArena::new();
        let mut open: BinaryHeap<OpenEntry> = BinaryHeap::new();
        let mut best_g: HashMap<Label, u32> = HashMap::new();
        let mut closed: HashSet<Label> = HashSet::new();
        let mut found: Vec<NodeIndex> = Vec::new();
        let mut warnings = Vec::new();
        let mut nodes_expanded = 0;

        let start_f = self.heuristic(&request.from, destination, None);
        let start = arena.push(PathNode {
            stop: request.from.clone(),
            g_score: 0,
            predecessor: None,
            via: None,
        });
        best_g.insert((request.from.clone(), None), 0);
        open.push(OpenEntry {
            f_score: start_f,
            g_score: 0,
            node: start,
        });

        while let Some(entry) = open.pop() {
            let node = arena.get(entry.node);
            let label: Label = (node.stop.clone(), node.line().cloned());

            if closed.contains(&label) {
                continue;
            }
            // Superseded by a cheaper entry for the same label
            if best_g.get(&label).is_some_and(|&g| g < entry.g_score) {
                continue;
            }

            let current_stop = label.0.clone();
            let current_line = label.1.clone();
            let current_g = node.g_score;
            closed.insert(label);

            if &current_stop == destination {
                trace!(node = entry.node, cost = current_g, "destination reached");
                found.push(entry.node);
                if found.len() >= self.config.max_results {
                    break;
                }
                continue;
            }

            nodes_expanded += 1;
            if nodes_expanded > self.config.max_expansions {
                warnings.push(format!(
                    "search stopped after {} expansions",
                    self.config.max_expansions
                ));
                break;
            }

            let current_transfers = arena.transfers(entry.node);

            for edge in self.graph.edges_from(&current_stop) {
                let neighbor: Label = (edge.to.clone(), Some(edge.line_id.clone()));
                if closed.contains(&neighbor) || arena.visits(entry.node, &edge.to) {
                    continue;
                }

                let changes_line = current_line.as_ref().is_some_and(|l| l != &edge.line_id);
                if current_transfers + usize::from(changes_line) > max_transfers {
                    continue;
                }

                let delay = self.overlay.delay_for(&current_stop, &edge.to, &edge.line_id);
                if options.avoid_incidents
                    && delay.as_ref().is_some_and(|d| d.severity == Severity::Critical)
                {
                    continue;
                }

                let minutes = edge
                    .base_minutes
                    .saturating_add(delay.as_ref().map_or(0, |d| d.minutes));
                let penalty = if options.preferred_transport_types.is_empty()
                    || options.preferred_transport_types.contains(&edge.transport)
                {
                    0
                } else {
                    self.config.non_preferred_penalty_mins
                };
                let tentative = current_g.saturating_add(minutes).saturating_add(penalty);

                if best_g.get(&neighbor).is_some_and(|&g| g <= tentative) {
                    continue;
                }
                best_g.insert(neighbor, tentative);

                let f_score =
                    f64::from(tentative) + self.heuristic(&edge.to, destination, Some(edge.transport));
                let index = arena.push(PathNode {
                    stop: edge.to.clone(),
                    g_score: tentative,
                    predecessor: Some(entry.node),
                    via: Some(Via {
                        edge: edge.clone(),
                        minutes,
                        delay,
                    }),
                });
                open.push(OpenEntry {
                    f_score,
                    g_score: tentative,
                    node: index,
                });
            }
        }

        let journeys: Vec<Journey> = found
            .iter()
            .filter_map(|&index| self.reconstruct(&arena, index, request.departure))
            .collect();
        let mut journeys = rank_journeys(journeys);
        journeys.truncate(self.config.max_results);

        if journeys.is_empty() {
            warnings.push(format!(
                "no path found from {} to {} within {} transfers",
                request.from, request.to, max_transfers
            ));
        }

        debug!(
            from = %request.from,
            to = %request.to,
            found = journeys.len(),
            nodes_expanded,
            arena = arena.len(),
            "search finished"
        );

        Ok(SearchResult {
            alternative_available: journeys.len() > 1,
            journeys,
            nodes_expanded,
            warnings,
        })
    }

    /// Estimated minutes from `stop` to `destination` at the speed of
    /// `transport` (fallback speed when unknown).
    fn heuristic(&self, stop: &StopId, destination: &StopId, transport: Option<TransportType>) -> f64 {
        let (Some(a), Some(b)) = (self.graph.stop(stop), self.graph.stop(destination)) else {
            return 0.0;
        };
        let speed = transport
            .map(|t| self.config.speeds.speed_kmh(t))
            .filter(|s| *s > 0.0)
            .unwrap_or(self.config.fallback_speed_kmh);
        a.location.distance_km(&b.location) / speed * 60.0
    }

    /// Build the journey ending at `index`, timed from `departure`.
    fn reconstruct(
        &self,
        arena: &NodeArena,
        index: NodeIndex,
        departure: DateTime<Utc>,
    ) -> Option<Journey> {
        let path = arena.path_to(index);
        let mut cursor = departure;
        let mut segments = Vec::with_capacity(path.len().saturating_sub(1));

        for pair in path.windows(2) {
            let (prev, node) = (pair[0], pair[1]);
            let via = node.via.as_ref()?;
            let arrival = cursor + Duration::minutes(i64::from(via.minutes));

            segments.push(Segment {
                from: prev.stop.clone(),
                from_name: self.stop_name(&prev.stop),
                to: node.stop.clone(),
                to_name: self.stop_name(&node.stop),
                route_id: via.edge.route_id.clone(),
                line_id: via.edge.line_id.clone(),
                line_name: via.edge.line_name.clone(),
                transport: via.edge.transport,
                departure: cursor,
                arrival,
                duration_minutes: via.minutes,
                has_incident: via.delay.is_some(),
                delay_minutes: via.delay.as_ref().map_or(0, |d| d.minutes),
                severity: via.delay.as_ref().map(|d| d.severity),
            });
            cursor = arrival;
        }

        Journey::new(segments).ok()
    }

    fn stop_name(&self, id: &StopId) -> String {
        self.graph
            .stop(id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| id.to_string())
    }
}
