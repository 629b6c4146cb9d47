//! JSON API for the transit planner and incident reporting.
//!
//! A thin adapter: handlers validate payloads into domain types, call one
//! service method, and map the service's error kind to an HTTP status.

mod dto;
mod routes;
mod state;

pub use dto::*;
pub use routes::{AppError, create_router};
pub use state::AppState;
