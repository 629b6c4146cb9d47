//! Incident → edge delay mapping.
//!
//! An incident inflates the cost of the edges it touches by a delay looked
//! up from its disruption kind. Proximity to either endpoint doubles the
//! delay; several incidents on the same line stack additively.

use std::collections::HashMap;

use crate::domain::{Incident, IncidentId, IncidentKind, LineId, Severity, StopId};

/// Delay used for a cancelled service: large enough to make the edge a last resort.
pub const CANCELLED_DELAY_MINUTES: u32 = 999;

/// Delay category driving the base delay table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisruptionKind {
    MinorDelay,
    Crowding,
    Blocked,
    Cancelled,
    Accident,
    TrafficJam,
    Other,
}

impl DisruptionKind {
    /// Base delay in minutes.
    pub fn base_delay(self) -> u32 {
        match self {
            DisruptionKind::MinorDelay => 5,
            DisruptionKind::Crowding => 3,
            DisruptionKind::Blocked => 30,
            DisruptionKind::Cancelled => CANCELLED_DELAY_MINUTES,
            DisruptionKind::Accident => 15,
            DisruptionKind::TrafficJam => 10,
            DisruptionKind::Other => 2,
        }
    }
}

impl From<IncidentKind> for DisruptionKind {
    fn from(kind: IncidentKind) -> Self {
        match kind {
            IncidentKind::Generic => DisruptionKind::Other,
            IncidentKind::NetworkFailure => DisruptionKind::Blocked,
            IncidentKind::VehicleFailure => DisruptionKind::MinorDelay,
            IncidentKind::Accident => DisruptionKind::Accident,
            IncidentKind::TrafficJam => DisruptionKind::TrafficJam,
            IncidentKind::PlatformChange => DisruptionKind::Crowding,
        }
    }
}

/// Delay applied to one edge, possibly accumulated over several incidents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeDelay {
    pub minutes: u32,
    pub severity: Severity,
    pub incidents: Vec<IncidentId>,
}

impl EdgeDelay {
    fn single(incident: IncidentId, minutes: u32) -> Self {
        Self {
            minutes,
            severity: Severity::from_delay(minutes),
            incidents: vec![incident],
        }
    }

    /// Stack another delay onto this one; severity follows the sum.
    fn accumulate(&mut self, other: EdgeDelay) {
        self.minutes = self.minutes.saturating_add(other.minutes);
        self.severity = Severity::from_delay(self.minutes);
        self.incidents.extend(other.incidents);
    }
}

/// Delay contributed by `incident` to the edge `from → to` on `line`.
///
/// Returns `None` when the incident is not published, is on another line,
/// or is restricted to segments that don't include this edge.
pub fn edge_delay(incident: &Incident, from: &StopId, to: &StopId, line: &LineId) -> Option<EdgeDelay> {
    if !incident.is_active() || !incident.affects_line(line) {
        return None;
    }

    if !incident.segments.is_empty() {
        let on_segment = incident
            .segments
            .iter()
            .any(|(a, b)| (a == from && b == to) || (a == to && b == from));
        if !on_segment {
            return None;
        }
    }

    let base = incident
        .delay_minutes
        .unwrap_or_else(|| DisruptionKind::from(incident.kind).base_delay());

    let near = incident.stop_ids.iter().any(|s| s == from || s == to);
    let minutes = if near { base.saturating_mul(2) } else { base };

    Some(EdgeDelay::single(incident.id, minutes))
}

/// Active incidents indexed by line for per-edge lookup during a search.
#[derive(Debug, Default)]
pub struct IncidentOverlay<'a> {
    by_line: HashMap<&'a LineId, Vec<&'a Incident>>,
}

impl<'a> IncidentOverlay<'a> {
    /// Index the published incidents among `incidents`.
    pub fn new(incidents: &'a [Incident]) -> Self {
        let mut by_line: HashMap<&LineId, Vec<&Incident>> = HashMap::new();
        for incident in incidents.iter().filter(|i| i.is_active()) {
            for line in &incident.line_ids {
                by_line.entry(line).or_default().push(incident);
            }
        }
        Self { by_line }
    }

    /// Overlay with no incidents.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Total delay on an edge from all incidents on its line.
    pub fn delay_for(&self, from: &StopId, to: &StopId, line: &LineId) -> Option<EdgeDelay> {
        let incidents = self.by_line.get(line)?;
        incidents
            .iter()
            .filter_map(|incident| edge_delay(incident, from, to, line))
            .reduce(|mut acc, next| {
                acc.accumulate(next);
                acc
            })
    }

    pub fn is_empty(&self) -> bool {
        self.by_line.is_empty()
    }
}
