//! Quorum engine errors.

use crate::domain::{DomainError, PendingId};
use crate::error::ErrorKind;
use crate::store::StoreError;

/// Error from report submission or moderation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QuorumError {
    /// Rejected before touching any state
    #[error("invalid report: {0}")]
    InvalidInput(String),

    /// Duplicate reporter or a decision on an already-decided report
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The pending report outlived its lifetime
    #[error("pending report {0} has expired")]
    Expired(PendingId),

    /// A promoted report is missing its incident id
    #[error("pending report {0} was promoted without an incident id")]
    MissingIncident(PendingId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QuorumError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QuorumError::InvalidInput(_) => ErrorKind::InvalidInput,
            QuorumError::Domain(e) => e.kind(),
            QuorumError::Expired(_) => ErrorKind::Exhausted,
            QuorumError::MissingIncident(_) => ErrorKind::Internal,
            QuorumError::Store(e) => e.kind(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}
