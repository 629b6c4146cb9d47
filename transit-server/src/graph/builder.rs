//! Adjacency graph construction from reference data.
//!
//! Edge weights are base travel minutes only. Incident delay is layered on
//! at query time so one graph can serve every request regardless of the
//! current incident set.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::domain::{Line, LineId, RouteId, Stop, StopId, TransportType, Trip};
use crate::geo::{GeoPoint, travel_minutes};

/// Shortest edge the builder will emit, in minutes.
pub const MIN_EDGE_MINUTES: u32 = 2;

/// Average speed per transport type, in km/h.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedTable {
    pub bus: f64,
    pub rail: f64,
    pub metro: f64,
    pub tram: f64,
}

impl SpeedTable {
    pub fn speed_kmh(&self, transport: TransportType) -> f64 {
        match transport {
            TransportType::Bus => self.bus,
            TransportType::Rail => self.rail,
            TransportType::Metro => self.metro,
            TransportType::Tram => self.tram,
        }
    }
}

impl Default for SpeedTable {
    fn default() -> Self {
        Self {
            bus: 20.0,
            rail: 60.0,
            metro: 60.0,
            tram: 60.0,
        }
    }
}

/// A directed edge between consecutive stops of a trip.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub to: StopId,
    pub route_id: RouteId,
    pub line_id: LineId,
    pub line_name: String,
    pub transport: TransportType,
    pub base_minutes: u32,
}

/// Directed travel-time graph over stops.
#[derive(Debug, Clone, Default)]
pub struct TransitGraph {
    stops: HashMap<StopId, Stop>,
    adjacency: HashMap<StopId, Vec<Edge>>,
    edge_count: usize,
}

impl TransitGraph {
    /// Build the graph from reference data.
    ///
    /// Consecutive calls of every trip (ordered by sequence number) become
    /// an edge. Trips of the same line between the same pair of stops
    /// collapse into one edge. Calls at unknown stops and trips on unknown
    /// lines are skipped.
    pub fn build(stops: &[Stop], lines: &[Line], trips: &[Trip], speeds: &SpeedTable) -> Self {
        let stops: HashMap<StopId, Stop> = stops.iter().map(|s| (s.id.clone(), s.clone())).collect();
        let lines: HashMap<&LineId, &Line> = lines.iter().map(|l| (&l.id, l)).collect();

        let mut adjacency: HashMap<StopId, Vec<Edge>> = HashMap::new();
        let mut seen: HashSet<(StopId, StopId, LineId)> = HashSet::new();
        let mut edge_count = 0;

        for trip in trips {
            let Some(line) = lines.get(&trip.line_id) else {
                warn!(trip = %trip.id, line = %trip.line_id, "trip references unknown line, skipping");
                continue;
            };

            let calls = trip.ordered_calls();
            for pair in calls.windows(2) {
                let (from_id, to_id) = (&pair[0].stop_id, &pair[1].stop_id);
                if from_id == to_id {
                    continue;
                }
                let (Some(from), Some(to)) = (stops.get(from_id), stops.get(to_id)) else {
                    warn!(trip = %trip.id, from = %from_id, to = %to_id, "call at unknown stop, skipping edge");
                    continue;
                };

                if !seen.insert((from_id.clone(), to_id.clone(), line.id.clone())) {
                    continue;
                }

                let base_minutes =
                    edge_minutes(&from.location, &to.location, speeds.speed_kmh(line.transport));
                adjacency.entry(from_id.clone()).or_default().push(Edge {
                    to: to_id.clone(),
                    route_id: trip.route_id.clone(),
                    line_id: line.id.clone(),
                    line_name: line.name.clone(),
                    transport: line.transport,
                    base_minutes,
                });
                edge_count += 1;
            }
        }

        debug!(stops = stops.len(), edges = edge_count, "built transit graph");

        Self {
            stops,
            adjacency,
            edge_count,
        }
    }

    pub fn stop(&self, id: &StopId) -> Option<&Stop> {
        self.stops.get(id)
    }

    pub fn contains_stop(&self, id: &StopId) -> bool {
        self.stops.contains_key(id)
    }

    /// Outgoing edges of a stop (empty for unknown or terminal stops).
    pub fn edges_from(&self, id: &StopId) -> &[Edge] {
        self.adjacency.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn stop_count(&self) -> usize {
        self.stops.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn is_empty(&self) -> bool {
        self.edge_count == 0
    }
}

/// Base minutes between two points: distance over speed, rounded, floored
/// at [`MIN_EDGE_MINUTES`].
pub fn edge_minutes(from: &GeoPoint, to: &GeoPoint, speed_kmh: f64) -> u32 {
    let minutes = travel_minutes(from.distance_km(to), speed_kmh).round();
    if !minutes.is_finite() {
        return u32::MAX;
    }
    (minutes as u32).max(MIN_EDGE_MINUTES)
}
