//! Crowd report quorum.
//!
//! Independent reports of the same disruption are merged into a pending
//! report. Once enough reporters with enough combined reputation agree, the
//! pending report is promoted to a published incident; reports that come
//! close are queued for a moderator instead.

mod engine;
mod error;
mod threshold;

pub use engine::{Approval, QuorumEngine, ReportSubmission, SubmitOutcome, SubmitStatus};
pub use error::QuorumError;
pub use threshold::{ThresholdConfig, ThresholdResult, calculate_threshold};
