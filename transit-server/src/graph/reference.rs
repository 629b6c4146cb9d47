//! Reference data snapshot loaded at startup.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::builder::{SpeedTable, TransitGraph};
use crate::domain::{Line, Stop, Trip};
use crate::error::ErrorKind;
use crate::geo::GeoPoint;

/// Errors loading reference data.
#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    /// File could not be read
    #[error("failed to read reference data from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// File contents are not valid reference data
    #[error("invalid reference data: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ReferenceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReferenceError::Io { .. } => ErrorKind::Internal,
            ReferenceError::Parse(_) => ErrorKind::InvalidInput,
        }
    }
}

/// Stops, lines and trips as produced by the importer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceData {
    pub stops: Vec<Stop>,
    pub lines: Vec<Line>,
    pub trips: Vec<Trip>,
}

impl ReferenceData {
    /// Load a JSON snapshot.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReferenceError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ReferenceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Write a JSON snapshot.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ReferenceError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ReferenceError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn build_graph(&self, speeds: &SpeedTable) -> TransitGraph {
        TransitGraph::build(&self.stops, &self.lines, &self.trips, speeds)
    }

    /// Closest stop to `point`, with its distance in metres.
    pub fn nearest_stop(&self, point: &GeoPoint) -> Option<(&Stop, f64)> {
        self.stops
            .iter()
            .map(|s| (s, s.location.distance_m(point)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}
