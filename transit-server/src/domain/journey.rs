//! Journey types.
//!
//! A `Journey` is a complete trip from origin to destination, made of one
//! segment per graph edge travelled, possibly spanning several lines.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{DomainError, LineId, RouteId, Severity, StopId, TransportType};

/// Travel on a single line between two consecutive stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub from: StopId,
    pub from_name: String,
    pub to: StopId,
    pub to_name: String,
    pub route_id: RouteId,
    pub line_id: LineId,
    pub line_name: String,
    pub transport: TransportType,
    pub departure: DateTime<Utc>,
    pub arrival: DateTime<Utc>,
    /// Scheduled minutes plus incident delay.
    pub duration_minutes: u32,
    pub has_incident: bool,
    pub delay_minutes: u32,
    pub severity: Option<Severity>,
}

/// A complete journey from origin to destination.
///
/// # Invariants
///
/// - At least one segment
/// - Consecutive segments connect (destination of one = origin of next)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Journey {
    segments: Vec<Segment>,
}

impl Journey {
    /// Constructs a journey from ordered segments.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the list is empty or the segments don't connect.
    pub fn new(segments: Vec<Segment>) -> Result<Self, DomainError> {
        if segments.is_empty() {
            return Err(DomainError::EmptyJourney);
        }

        for window in segments.windows(2) {
            if window[0].to != window[1].from {
                return Err(DomainError::SegmentsNotConnected(
                    window[0].to.clone(),
                    window[1].from.clone(),
                ));
            }
        }

        Ok(Journey { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn origin(&self) -> &StopId {
        &self.segments[0].from
    }

    pub fn destination(&self) -> &StopId {
        &self.segments[self.segments.len() - 1].to
    }

    pub fn departure_time(&self) -> DateTime<Utc> {
        self.segments[0].departure
    }

    pub fn arrival_time(&self) -> DateTime<Utc> {
        self.segments[self.segments.len() - 1].arrival
    }

    /// Sum of segment durations in minutes, incident delays included.
    pub fn total_duration_minutes(&self) -> u32 {
        self.segments
            .iter()
            .map(|s| s.duration_minutes)
            .fold(0u32, u32::saturating_add)
    }

    /// Number of line changes.
    pub fn transfer_count(&self) -> usize {
        self.segments
            .windows(2)
            .filter(|w| w[0].line_id != w[1].line_id)
            .count()
    }

    /// Lines used, in travel order, without consecutive repeats.
    pub fn lines(&self) -> Vec<&LineId> {
        let mut lines: Vec<&LineId> = Vec::new();
        for segment in &self.segments {
            if lines.last() != Some(&&segment.line_id) {
                lines.push(&segment.line_id);
            }
        }
        lines
    }

    pub fn has_incident(&self) -> bool {
        self.segments.iter().any(|s| s.has_incident)
    }

    /// Worst severity across segments, if any segment is disrupted.
    pub fn worst_severity(&self) -> Option<Severity> {
        self.segments.iter().filter_map(|s| s.severity).max()
    }

    /// The same journey with every time shifted to start at `departure`.
    pub fn retimed(&self, departure: DateTime<Utc>) -> Journey {
        let shift: Duration = departure - self.departure_time();
        let segments = self
            .segments
            .iter()
            .map(|s| Segment {
                departure: s.departure + shift,
                arrival: s.arrival + shift,
                ..s.clone()
            })
            .collect();
        Journey { segments }
    }
}
