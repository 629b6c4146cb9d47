//! Live incidents: how they slow the network down, and how staff manage them.

mod delay;
mod service;

pub use delay::{CANCELLED_DELAY_MINUTES, DisruptionKind, EdgeDelay, IncidentOverlay, edge_delay};
pub use service::{IncidentError, IncidentService, StaffIncident};
