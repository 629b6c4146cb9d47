//! Reporter trust.
//!
//! Each user has an integer reputation that moves when their reports are
//! judged, and a derived trust multiplier in `[0.5, 2.5]` used to weight
//! their reports when deciding whether to notify.

mod score;
mod service;

pub use score::{
    ReportHistory, TrustConfig, apply_delta, compute_trust, reputation_delta,
};
pub use service::TrustService;
