//! Domain types for the transit planner and incident reporting.
//!
//! This module contains the core domain model types. Identifiers and enums
//! enforce their invariants at construction time, so loosely typed payloads
//! are rejected at the boundary before they reach the planner or the
//! quorum engine.

mod error;
mod ids;
mod incident;
mod journey;
mod report;
mod transit;
mod user;

pub use error::DomainError;
pub use ids::{IncidentId, InvalidId, LineId, PendingId, RouteId, StopId, TripId, UserId};
pub use incident::{Incident, IncidentKind, IncidentSource, IncidentStatus, Severity};
pub use journey::{Journey, Segment};
pub use report::{
    ModeratorQueueItem, PendingIncidentReport, PendingStatus, Priority, ReportOutcome,
    ReportRecord,
};
pub use transit::{Line, Stop, StopTime, TransportType, Trip};
pub use user::{TrustBreakdown, User};
