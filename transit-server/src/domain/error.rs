//! Domain error types.
//!
//! These errors represent validation failures and data inconsistencies
//! in the domain layer. They are distinct from store and transport errors.

use super::{InvalidId, StopId, UserId};
use crate::error::ErrorKind;
use crate::geo::InvalidCoordinates;

/// Domain-level errors for validation and data consistency.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DomainError {
    /// Unrecognised incident kind string
    #[error("unknown incident kind: {0}")]
    UnknownIncidentKind(String),

    /// Unrecognised transport type string
    #[error("unknown transport type: {0}")]
    UnknownTransportType(String),

    /// Malformed identifier
    #[error(transparent)]
    InvalidId(#[from] InvalidId),

    /// Coordinates out of range
    #[error(transparent)]
    InvalidCoordinates(#[from] InvalidCoordinates),

    /// The user already reported this pending item
    #[error("user {0} has already reported this incident")]
    DuplicateReporter(UserId),

    /// Status transition not permitted from the current state
    #[error("cannot move from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    /// Consecutive segments don't share a stop
    #[error("segments do not connect: {0} then {1}")]
    SegmentsNotConnected(StopId, StopId),

    /// Journey has no segments
    #[error("journey must have at least one segment")]
    EmptyJourney,
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::DuplicateReporter(_) | DomainError::InvalidTransition { .. } => {
                ErrorKind::Conflict
            }
            DomainError::SegmentsNotConnected(..) | DomainError::EmptyJourney => {
                ErrorKind::Internal
            }
            _ => ErrorKind::InvalidInput,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = DomainError::UnknownIncidentKind("meteor".into());
        assert_eq!(err.to_string(), "unknown incident kind: meteor");

        let err = DomainError::DuplicateReporter(UserId::parse("u1").unwrap());
        assert_eq!(err.to_string(), "user u1 has already reported this incident");

        let err = DomainError::InvalidTransition {
            from: "REJECTED",
            to: "MANUALLY_APPROVED",
        };
        assert_eq!(err.to_string(), "cannot move from REJECTED to MANUALLY_APPROVED");

        let err = DomainError::EmptyJourney;
        assert_eq!(err.to_string(), "journey must have at least one segment");
    }

    #[test]
    fn kinds() {
        let dup = DomainError::DuplicateReporter(UserId::parse("u1").unwrap());
        assert_eq!(dup.kind(), ErrorKind::Conflict);
        assert_eq!(
            DomainError::UnknownTransportType("x".into()).kind(),
            ErrorKind::InvalidInput
        );
    }
}
