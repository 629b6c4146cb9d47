//! Reference data: stops, lines and scheduled trips.
//!
//! These are produced by the importer and are read-only at runtime.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::{DomainError, LineId, RouteId, StopId, TripId};
use crate::geo::GeoPoint;

/// Mode of transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    Bus,
    Rail,
    Metro,
    Tram,
}

impl TransportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportType::Bus => "bus",
            TransportType::Rail => "rail",
            TransportType::Metro => "metro",
            TransportType::Tram => "tram",
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bus" => Ok(TransportType::Bus),
            "rail" | "train" => Ok(TransportType::Rail),
            "metro" | "subway" => Ok(TransportType::Metro),
            "tram" => Ok(TransportType::Tram),
            _ => Err(DomainError::UnknownTransportType(s.to_string())),
        }
    }
}

/// A stop or station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub id: StopId,
    pub name: String,
    pub location: GeoPoint,
    pub transport: TransportType,
}

/// A line (the unit passengers recognise, e.g. "Bus 12").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub id: LineId,
    pub name: String,
    pub transport: TransportType,
}

/// One call of a trip at a stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopTime {
    pub stop_id: StopId,
    pub arrival: Option<NaiveTime>,
    pub departure: Option<NaiveTime>,
    pub sequence: u32,
}

/// A scheduled trip: an ordered sequence of calls on one route of one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub route_id: RouteId,
    pub line_id: LineId,
    pub stop_times: Vec<StopTime>,
}

impl Trip {
    /// Calls ordered by sequence number.
    pub fn ordered_calls(&self) -> Vec<&StopTime> {
        let mut calls: Vec<&StopTime> = self.stop_times.iter().collect();
        calls.sort_by_key(|c| c.sequence);
        calls
    }
}
