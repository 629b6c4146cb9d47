//! Transit network graph.
//!
//! Converts stop/line/trip reference data into a directed adjacency graph
//! weighted by base travel minutes.

mod builder;
mod reference;

pub use builder::{Edge, MIN_EDGE_MINUTES, SpeedTable, TransitGraph, edge_minutes};
pub use reference::{ReferenceData, ReferenceError};
