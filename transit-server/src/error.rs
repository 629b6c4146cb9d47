//! Error taxonomy shared across subsystems.
//!
//! Each module defines its own `thiserror` enum; every one of them can be
//! classified into an [`ErrorKind`] so the boundary adapter can decide how
//! to surface it and whether a retry makes sense.

/// Coarse classification of failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown stop, line, incident or pending-report id.
    NotFound,
    /// Malformed input rejected before any state mutation.
    InvalidInput,
    /// Request collides with existing state (duplicate reporter, wrong status).
    Conflict,
    /// Store timeout or unavailability; safe to retry from a fresh read.
    Transient,
    /// Pending report past its expiry.
    Exhausted,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Whether the failed operation may be re-executed.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}
