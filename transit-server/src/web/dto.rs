//! Data transfer objects for web requests and responses.
//!
//! Requests arrive as loosely typed JSON and are converted into domain types
//! here, so nothing malformed reaches the planner or the quorum engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    DomainError, Incident, IncidentKind, Journey, LineId, ModeratorQueueItem, Segment, Severity,
    StopId, TransportType, UserId,
};
use crate::geo::GeoPoint;
use crate::incidents::StaffIncident;
use crate::notify::DispatchReport;
use crate::planner::{SearchOptions, SearchResult};
use crate::quorum::ReportSubmission;

fn parse_lines(raw: &[String]) -> Result<Vec<LineId>, DomainError> {
    raw.iter()
        .map(|l| LineId::parse(l.as_str()).map_err(DomainError::from))
        .collect()
}

/// Query for the nearest stop.
#[derive(Debug, Deserialize)]
pub struct NearestStopQuery {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Serialize)]
pub struct NearestStopResponse {
    pub stop_id: StopId,
    pub name: String,
    pub transport: TransportType,
    pub distance_m: f64,
}

/// Request to plan a journey.
#[derive(Debug, Deserialize)]
pub struct JourneySearchRequest {
    /// Origin stop id
    pub from: String,

    /// Destination stop id
    pub to: String,

    /// Departure time (defaults to now)
    pub departure: Option<DateTime<Utc>>,

    pub max_transfers: Option<usize>,

    /// Transport type names, e.g. "bus", "rail"
    #[serde(default)]
    pub preferred_transport_types: Vec<String>,

    #[serde(default)]
    pub avoid_incidents: bool,
}

/// A validated journey query.
#[derive(Debug)]
pub struct JourneyQuery {
    pub from: StopId,
    pub to: StopId,
    pub departure: Option<DateTime<Utc>>,
    pub options: SearchOptions,
}

impl TryFrom<JourneySearchRequest> for JourneyQuery {
    type Error = DomainError;

    fn try_from(req: JourneySearchRequest) -> Result<Self, Self::Error> {
        let preferred_transport_types = req
            .preferred_transport_types
            .iter()
            .map(|t| t.parse::<TransportType>())
            .collect::<Result<_, _>>()?;

        Ok(Self {
            from: StopId::parse(req.from)?,
            to: StopId::parse(req.to)?,
            departure: req.departure,
            options: SearchOptions {
                max_transfers: req.max_transfers,
                preferred_transport_types,
                avoid_incidents: req.avoid_incidents,
            },
        })
    }
}

/// One segment of a journey option.
#[derive(Debug, Serialize)]
pub struct SegmentResult {
    pub from: StopId,
    pub from_name: String,
    pub to: StopId,
    pub to_name: String,
    pub line_id: LineId,
    pub line_name: String,
    pub transport: TransportType,
    pub departure: DateTime<Utc>,
    pub arrival: DateTime<Utc>,
    pub duration_mins: u32,
    pub has_incident: bool,
    pub delay_mins: u32,
    pub severity: Option<Severity>,
}

impl SegmentResult {
    pub fn from_segment(segment: &Segment) -> Self {
        Self {
            from: segment.from.clone(),
            from_name: segment.from_name.clone(),
            to: segment.to.clone(),
            to_name: segment.to_name.clone(),
            line_id: segment.line_id.clone(),
            line_name: segment.line_name.clone(),
            transport: segment.transport,
            departure: segment.departure,
            arrival: segment.arrival,
            duration_mins: segment.duration_minutes,
            has_incident: segment.has_incident,
            delay_mins: segment.delay_minutes,
            severity: segment.severity,
        }
    }
}

/// A journey option.
#[derive(Debug, Serialize)]
pub struct JourneyResult {
    pub segments: Vec<SegmentResult>,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    /// Total duration in minutes
    pub duration_mins: u32,
    /// Number of changes
    pub transfers: usize,
    pub has_incident: bool,
    pub worst_severity: Option<Severity>,
}

impl JourneyResult {
    pub fn from_journey(journey: &Journey) -> Self {
        Self {
            segments: journey.segments().iter().map(SegmentResult::from_segment).collect(),
            departure_time: journey.departure_time(),
            arrival_time: journey.arrival_time(),
            duration_mins: journey.total_duration_minutes(),
            transfers: journey.transfer_count(),
            has_incident: journey.has_incident(),
            worst_severity: journey.worst_severity(),
        }
    }
}

/// Response for journey search.
#[derive(Debug, Serialize)]
pub struct JourneySearchResponse {
    pub journeys: Vec<JourneyResult>,
    pub alternative_available: bool,
    pub nodes_expanded: usize,
    pub warnings: Vec<String>,
}

impl From<&SearchResult> for JourneySearchResponse {
    fn from(result: &SearchResult) -> Self {
        Self {
            journeys: result.journeys.iter().map(JourneyResult::from_journey).collect(),
            alternative_available: result.alternative_available,
            nodes_expanded: result.nodes_expanded,
            warnings: result.warnings.clone(),
        }
    }
}

/// A crowd report of a disruption.
#[derive(Debug, Deserialize)]
pub struct SubmitReportRequest {
    /// Incident kind, e.g. "accident"
    pub kind: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub line_ids: Vec<String>,
    pub reporter_id: String,
    /// Only used for reporters the server has never seen
    #[serde(default)]
    pub reporter_reputation: u32,
}

impl TryFrom<SubmitReportRequest> for ReportSubmission {
    type Error = DomainError;

    fn try_from(req: SubmitReportRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: req.kind.parse::<IncidentKind>()?,
            location: GeoPoint::new(req.lat, req.lon)?,
            line_ids: parse_lines(&req.line_ids)?,
            reporter_id: UserId::parse(req.reporter_id)?,
            reporter_reputation: req.reporter_reputation,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub moderator_id: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub moderator_id: String,
    pub reason: String,
    #[serde(default)]
    pub mark_fake: bool,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub items: Vec<ModeratorQueueItem>,
}

/// Staff request to publish an incident.
#[derive(Debug, Deserialize)]
pub struct CreateIncidentRequest {
    pub kind: String,
    pub title: Option<String>,
    pub line_ids: Vec<String>,
    #[serde(default)]
    pub stop_ids: Vec<String>,
    /// Affected stop pairs, either direction
    #[serde(default)]
    pub segments: Vec<(String, String)>,
    pub delay_minutes: Option<u32>,
    pub created_by: String,
}

impl TryFrom<CreateIncidentRequest> for StaffIncident {
    type Error = DomainError;

    fn try_from(req: CreateIncidentRequest) -> Result<Self, Self::Error> {
        let stop_ids = req
            .stop_ids
            .into_iter()
            .map(StopId::parse)
            .collect::<Result<_, _>>()?;
        let segments = req
            .segments
            .into_iter()
            .map(|(a, b)| Ok((StopId::parse(a)?, StopId::parse(b)?)))
            .collect::<Result<_, DomainError>>()?;

        Ok(Self {
            kind: req.kind.parse::<IncidentKind>()?,
            title: req.title,
            line_ids: parse_lines(&req.line_ids)?,
            stop_ids,
            segments,
            delay_minutes: req.delay_minutes,
            created_by: UserId::parse(req.created_by)?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CreateIncidentResponse {
    pub incident: Incident,
    pub dispatch: DispatchReport,
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
