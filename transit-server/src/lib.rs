//! Disruption-aware transit planner and crowd incident reporting.
//!
//! Plans journeys over a stop/line graph whose edge costs follow live
//! incidents, and turns independent user reports of a disruption into a
//! published incident once enough trusted reporters agree.

pub mod cache;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod geo;
pub mod graph;
pub mod incidents;
pub mod notify;
pub mod planner;
pub mod quorum;
pub mod store;
pub mod sweep;
pub mod trust;
pub mod web;
