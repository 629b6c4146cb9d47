//! Unit tests for the multi-path A* search.

use super::*;
use crate::domain::{
    Incident, IncidentKind, IncidentSource, Line, LineId, RouteId, Severity, Stop, StopId,
    StopTime, TransportType, Trip, TripId, UserId,
};
use crate::error::ErrorKind;
use crate::geo::GeoPoint;
use crate::graph::{SpeedTable, TransitGraph};
use crate::incidents::IncidentOverlay;
use chrono::{DateTime, Duration, TimeZone, Utc};

/// Degrees per kilometre at the equator.
const KM: f64 = 0.008_993;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap()
}

fn id(s: &str) -> StopId {
    StopId::parse(s).unwrap()
}

fn line_id(s: &str) -> LineId {
    LineId::parse(s).unwrap()
}

/// Small network builder: stops on a kilometre grid, one trip per line.
#[derive(Default)]
struct Network {
    stops: Vec<Stop>,
    lines: Vec<Line>,
    trips: Vec<Trip>,
}

impl Network {
    fn stop(mut self, name: &str, x_km: f64, y_km: f64) -> Self {
        self.stops.push(Stop {
            id: id(name),
            name: format!("{name} Street"),
            location: GeoPoint::new(y_km * KM, x_km * KM).unwrap(),
            transport: TransportType::Bus,
        });
        self
    }

    fn line(mut self, name: &str, transport: TransportType, calls: &[&str]) -> Self {
        self.lines.push(Line {
            id: line_id(name),
            name: format!("Line {name}"),
            transport,
        });
        self.trips.push(Trip {
            id: TripId::parse(format!("{name}-T1")).unwrap(),
            route_id: RouteId::parse(format!("{name}-R")).unwrap(),
            line_id: line_id(name),
            stop_times: calls
                .iter()
                .enumerate()
                .map(|(i, s)| StopTime {
                    stop_id: id(s),
                    arrival: None,
                    departure: None,
                    sequence: i as u32,
                })
                .collect(),
        });
        self
    }

    fn graph(&self) -> TransitGraph {
        TransitGraph::build(&self.stops, &self.lines, &self.trips, &SpeedTable::default())
    }
}

/// A–B–C on one bus line, 1 km apart.
fn abc() -> Network {
    Network::default()
        .stop("A", 0.0, 0.0)
        .stop("B", 1.0, 0.0)
        .stop("C", 2.0, 0.0)
        .line("L1", TransportType::Bus, &["A", "B", "C"])
}

/// Four disjoint lines from A to C with increasing length.
fn four_ways() -> Network {
    abc()
        .stop("D", 1.0, 1.0)
        .stop("E", 1.0, -2.0)
        .stop("F", 1.0, 3.0)
        .line("L2", TransportType::Bus, &["A", "D", "C"])
        .line("L3", TransportType::Bus, &["A", "E", "C"])
        .line("L4", TransportType::Bus, &["A", "F", "C"])
}

fn staff_incident(kind: IncidentKind, line: &str) -> Incident {
    Incident::published(
        kind,
        vec![line_id(line)],
        IncidentSource::Staff {
            created_by: UserId::parse("admin").unwrap(),
        },
        t0(),
    )
}

/// Blocking incident restricted to one segment.
fn blocked(line: &str, from: &str, to: &str) -> Incident {
    let mut incident = staff_incident(IncidentKind::NetworkFailure, line);
    incident.segments = vec![(id(from), id(to))];
    incident
}

fn search(
    graph: &TransitGraph,
    incidents: &[Incident],
    request: &SearchRequest,
) -> Result<SearchResult, SearchError> {
    let overlay = IncidentOverlay::new(incidents);
    let config = SearchConfig::default();
    Planner::new(graph, &overlay, &config).search(request)
}

fn request(from: &str, to: &str) -> SearchRequest {
    SearchRequest::new(id(from), id(to), t0())
}

#[test]
fn single_line_journey() {
    let graph = abc().graph();
    let result = search(&graph, &[], &request("A", "C")).unwrap();

    assert_eq!(result.journeys.len(), 1);
    assert!(!result.alternative_available);
    assert!(result.warnings.is_empty());

    let journey = &result.journeys[0];
    assert_eq!(journey.total_duration_minutes(), 6);
    assert_eq!(journey.transfer_count(), 0);
    assert_eq!(journey.segments().len(), 2);
    assert!(!journey.has_incident());
}

#[test]
fn segments_carry_absolute_times_and_names() {
    let graph = abc().graph();
    let result = search(&graph, &[], &request("A", "C")).unwrap();
    let segments = result.journeys[0].segments();

    assert_eq!(segments[0].from_name, "A Street");
    assert_eq!(segments[0].line_name, "Line L1");
    assert_eq!(segments[0].departure, t0());
    assert_eq!(segments[0].arrival, t0() + Duration::minutes(3));
    assert_eq!(segments[1].departure, t0() + Duration::minutes(3));
    assert_eq!(segments[1].arrival, t0() + Duration::minutes(6));
}

#[test]
fn blocked_segment_adds_thirty_minutes() {
    let graph = abc().graph();
    let incidents = [blocked("L1", "A", "B")];
    let result = search(&graph, &incidents, &request("A", "C")).unwrap();

    let journey = &result.journeys[0];
    assert_eq!(journey.total_duration_minutes(), 36);

    let ab = &journey.segments()[0];
    assert!(ab.has_incident);
    assert_eq!(ab.delay_minutes, 30);
    assert_eq!(ab.duration_minutes, 33);
    assert_eq!(ab.severity, Some(Severity::Critical));

    let bc = &journey.segments()[1];
    assert!(!bc.has_incident);
    assert_eq!(bc.severity, None);
}

#[test]
fn unknown_stop_is_not_found() {
    let graph = abc().graph();

    let err = search(&graph, &[], &request("A", "Z")).unwrap_err();
    assert!(matches!(err, SearchError::StopNotFound(ref s) if s.as_str() == "Z"));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = search(&graph, &[], &request("Q", "C")).unwrap_err();
    assert!(matches!(err, SearchError::StopNotFound(ref s) if s.as_str() == "Q"));
}

#[test]
fn empty_graph_reports_no_path() {
    let graph = Network::default().graph();
    let result = search(&graph, &[], &request("A", "C")).unwrap();

    assert!(result.journeys.is_empty());
    assert!(!result.warnings.is_empty());
}

#[test]
fn unreachable_destination_is_empty_with_warning() {
    let graph = abc().stop("X", 5.0, 5.0).graph();
    let result = search(&graph, &[], &request("A", "X")).unwrap();

    assert!(result.journeys.is_empty());
    assert!(!result.alternative_available);
    assert!(result.warnings.iter().any(|w| w.contains("no path")));
}

#[test]
fn edges_are_directed() {
    let graph = abc().graph();
    let result = search(&graph, &[], &request("C", "A")).unwrap();
    assert!(result.journeys.is_empty());
}

#[test]
fn same_origin_and_destination() {
    let graph = abc().graph();
    let result = search(&graph, &[], &request("B", "B")).unwrap();
    assert!(result.journeys.is_empty());
    assert_eq!(result.warnings.len(), 1);
}

#[test]
fn returns_top_three_alternatives_ranked() {
    let graph = four_ways().graph();
    let result = search(&graph, &[], &request("A", "C")).unwrap();

    assert_eq!(result.journeys.len(), 3);
    assert!(result.alternative_available);

    let lines: Vec<&str> = result
        .journeys
        .iter()
        .map(|j| j.segments()[0].line_id.as_str())
        .collect();
    assert_eq!(lines, ["L1", "L2", "L3"]);

    for pair in result.journeys.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(
            (a.total_duration_minutes(), a.transfer_count())
                <= (b.total_duration_minutes(), b.transfer_count())
        );
    }
}

#[test]
fn incident_reorders_alternatives() {
    let graph = four_ways().graph();
    let incidents = [staff_incident(IncidentKind::Accident, "L1")];
    let result = search(&graph, &incidents, &request("A", "C")).unwrap();

    // L1 now costs 6 + 2×15; L2 (8) and L3 (14) overtake it
    assert_eq!(result.journeys[0].segments()[0].line_id.as_str(), "L2");
    assert_eq!(result.journeys[1].segments()[0].line_id.as_str(), "L3");
}

#[test]
fn transfer_cap_is_enforced() {
    let graph = Network::default()
        .stop("A", 0.0, 0.0)
        .stop("B", 1.0, 0.0)
        .stop("C", 2.0, 0.0)
        .line("L1", TransportType::Bus, &["A", "B"])
        .line("L2", TransportType::Bus, &["B", "C"])
        .graph();

    let capped = request("A", "C").with_options(SearchOptions {
        max_transfers: Some(0),
        ..SearchOptions::default()
    });
    let result = search(&graph, &[], &capped).unwrap();
    assert!(result.journeys.is_empty());

    let result = search(&graph, &[], &request("A", "C")).unwrap();
    assert_eq!(result.journeys.len(), 1);
    assert_eq!(result.journeys[0].transfer_count(), 1);
    assert_eq!(result.journeys[0].lines().len(), 2);
}

#[test]
fn preference_penalty_is_not_reported_as_travel_time() {
    let graph = abc().graph();
    let rail_only = request("A", "C").with_options(SearchOptions {
        preferred_transport_types: [TransportType::Rail].into_iter().collect(),
        ..SearchOptions::default()
    });

    let result = search(&graph, &[], &rail_only).unwrap();
    assert_eq!(result.journeys.len(), 1);
    assert_eq!(result.journeys[0].total_duration_minutes(), 6);
}

#[test]
fn preference_steers_between_equal_options() {
    // Bus A→C direct vs rail A→C direct over the same distance
    let graph = Network::default()
        .stop("A", 0.0, 0.0)
        .stop("C", 10.0, 0.0)
        .line("BUS", TransportType::Bus, &["A", "C"])
        .line("RAIL", TransportType::Rail, &["A", "C"])
        .graph();

    let result = search(&graph, &[], &request("A", "C")).unwrap();
    assert_eq!(result.journeys.len(), 2);
    // Rail is faster regardless of preference
    assert_eq!(result.journeys[0].segments()[0].line_id.as_str(), "RAIL");
    assert_eq!(result.journeys[0].total_duration_minutes(), 10);
    assert_eq!(result.journeys[1].total_duration_minutes(), 30);
}

#[test]
fn avoid_incidents_skips_critical_edges() {
    let graph = four_ways().graph();
    let incidents = [blocked("L1", "A", "B")];

    let avoiding = request("A", "C").with_options(SearchOptions {
        avoid_incidents: true,
        ..SearchOptions::default()
    });
    let result = search(&graph, &incidents, &avoiding).unwrap();

    assert!(!result.journeys.is_empty());
    assert!(
        result
            .journeys
            .iter()
            .all(|j| j.segments().iter().all(|s| s.line_id.as_str() != "L1"))
    );
}

#[test]
fn avoid_incidents_keeps_minor_disruptions() {
    let graph = abc().graph();
    let incidents = [staff_incident(IncidentKind::PlatformChange, "L1")];

    let avoiding = request("A", "C").with_options(SearchOptions {
        avoid_incidents: true,
        ..SearchOptions::default()
    });
    let result = search(&graph, &incidents, &avoiding).unwrap();

    assert_eq!(result.journeys.len(), 1);
    assert_eq!(result.journeys[0].total_duration_minutes(), 12);
    assert_eq!(result.journeys[0].worst_severity(), Some(Severity::Low));
}

#[test]
fn avoid_incidents_with_only_blocked_route_finds_nothing() {
    let graph = abc().graph();
    let incidents = [blocked("L1", "A", "B")];
    let avoiding = request("A", "C").with_options(SearchOptions {
        avoid_incidents: true,
        ..SearchOptions::default()
    });

    let result = search(&graph, &incidents, &avoiding).unwrap();
    assert!(result.journeys.is_empty());
}

#[test]
fn more_delay_never_shortens_journey() {
    let graph = abc().graph();
    let mut previous = 0;

    for delay in [0, 1, 4, 5, 14, 15, 29, 30, 120, 999] {
        let mut incident = staff_incident(IncidentKind::Generic, "L1");
        incident.delay_minutes = Some(delay);
        incident.segments = vec![(id("A"), id("B"))];
        let incidents = [incident];

        let result = search(&graph, &incidents, &request("A", "C")).unwrap();
        assert_eq!(result.journeys.len(), 1, "delay {delay} removed the journey");
        let total = result.journeys[0].total_duration_minutes();
        assert!(total >= previous);
        previous = total;
    }
}

#[test]
fn journeys_never_revisit_a_stop() {
    // A loop line that passes through A again before reaching C
    let graph = abc()
        .stop("D", 0.0, 1.0)
        .line("LOOP", TransportType::Bus, &["A", "D", "A", "C"])
        .graph();

    let result = search(&graph, &[], &request("A", "C")).unwrap();
    for journey in &result.journeys {
        let mut seen = std::collections::HashSet::new();
        assert!(seen.insert(journey.origin().clone()));
        for segment in journey.segments() {
            assert!(seen.insert(segment.to.clone()), "stop {} revisited", segment.to);
        }
    }
}

#[test]
fn expansion_cap_stops_search() {
    let graph = four_ways().graph();
    let overlay = IncidentOverlay::empty();
    let config = SearchConfig {
        max_expansions: 1,
        ..SearchConfig::default()
    };

    let result = Planner::new(&graph, &overlay, &config)
        .search(&request("A", "C"))
        .unwrap();
    assert!(result.journeys.is_empty());
    assert!(result.warnings.iter().any(|w| w.contains("expansions")));
}
