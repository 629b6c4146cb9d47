//! Journey planner using multi-path A* search.
//!
//! This module answers: "how do I get from this stop to that one, given
//! what is currently disrupted?"
//!
//! Search runs over a prebuilt [`TransitGraph`](crate::graph::TransitGraph)
//! with incident delays layered on per edge, and returns up to three ranked
//! alternatives.

mod arena;
mod config;
mod rank;
mod search;
mod service;

pub use config::SearchConfig;
pub use rank::rank_journeys;
pub use search::{Planner, SearchError, SearchOptions, SearchRequest, SearchResult};
pub use service::JourneyService;

#[cfg(test)]
mod search_tests;
