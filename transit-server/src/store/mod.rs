//! Document store abstraction.
//!
//! Incidents, pending reports, report records, the moderator queue and
//! users all live behind [`DocumentStore`]. The trait is object safe so
//! services hold an `Arc<dyn DocumentStore>`; every call returns a boxed
//! future.
//!
//! Pending reports and users carry a `version` field. Updates are
//! compare-and-swap: the write succeeds only if the stored version equals
//! the version the caller read, and the store bumps it. A lost race
//! surfaces as [`StoreError::VersionConflict`] and the caller re-executes
//! from a fresh read via [`retry`].

mod memory;
mod timed;

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tracing::warn;

use crate::domain::{
    Incident, IncidentId, LineId, ModeratorQueueItem, PendingId, PendingIncidentReport,
    PendingStatus, ReportRecord, User, UserId,
};
use crate::error::ErrorKind;

pub use memory::MemoryStore;
pub use timed::TimedStore;

/// Future returned by every store call.
pub type StoreFuture<'a, T> = BoxFuture<'a, Result<T, StoreError>>;

/// Error from the document store.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    /// The record changed since it was read.
    #[error("{entity} {id} was modified concurrently")]
    VersionConflict { entity: &'static str, id: String },

    /// Timeout or unavailability.
    #[error("store unavailable: {0}")]
    Transient(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::AlreadyExists { .. } => ErrorKind::Conflict,
            // A lost CAS is re-executed from a fresh read
            StoreError::VersionConflict { .. } | StoreError::Transient(_) => ErrorKind::Transient,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Persistence operations used by the services.
pub trait DocumentStore: Send + Sync {
    // Incidents

    /// Published incidents, for the planner's overlay.
    fn active_incidents(&self) -> StoreFuture<'_, Vec<Incident>>;

    fn get_incident(&self, id: IncidentId) -> StoreFuture<'_, Incident>;

    /// Insert or replace an incident.
    fn put_incident(&self, incident: Incident) -> StoreFuture<'_, ()>;

    /// Insert a new incident. Fails with `AlreadyExists` if the id is taken.
    fn insert_incident(&self, incident: Incident) -> StoreFuture<'_, ()>;

    // Pending reports

    fn get_pending(&self, id: PendingId) -> StoreFuture<'_, PendingIncidentReport>;

    /// Every pending report currently in `status`.
    fn pending_by_status(&self, status: PendingStatus)
    -> StoreFuture<'_, Vec<PendingIncidentReport>>;

    /// Pending reports whose last report is at or after `since`, any status.
    fn pending_since(&self, since: DateTime<Utc>) -> StoreFuture<'_, Vec<PendingIncidentReport>>;

    /// Insert a new report. Fails with `AlreadyExists` on id collision.
    fn insert_pending(&self, report: PendingIncidentReport) -> StoreFuture<'_, PendingIncidentReport>;

    /// Compare-and-swap on `report.version`; returns the stored copy with
    /// its bumped version.
    fn update_pending(&self, report: PendingIncidentReport) -> StoreFuture<'_, PendingIncidentReport>;

    // Report records

    fn insert_record(&self, record: ReportRecord) -> StoreFuture<'_, ()>;

    /// Store the verdict carried by `record` unless one is already recorded
    /// for `(record.user_id, record.pending_id)`, inserting the record if it
    /// is missing. Returns whether this call recorded the verdict.
    fn resolve_record(&self, record: ReportRecord) -> StoreFuture<'_, bool>;

    fn records_for_pending(&self, id: PendingId) -> StoreFuture<'_, Vec<ReportRecord>>;

    fn records_for_user_since(
        &self,
        user: UserId,
        since: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<ReportRecord>>;

    /// Every user who has ever submitted a report.
    fn reporter_ids(&self) -> StoreFuture<'_, Vec<UserId>>;

    // Moderator queue

    /// Add an item unless an open one already exists for the same pending
    /// report. Returns whether the item was added.
    fn enqueue_moderation(&self, item: ModeratorQueueItem) -> StoreFuture<'_, bool>;

    /// Mark open items for `pending` as reviewed. Returns whether any were.
    fn archive_moderation(
        &self,
        pending: PendingId,
        reviewed_by: Option<UserId>,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, bool>;

    /// Open items, highest priority first, then oldest first.
    fn open_moderation_items(&self) -> StoreFuture<'_, Vec<ModeratorQueueItem>>;

    // Users

    fn get_user(&self, id: UserId) -> StoreFuture<'_, User>;

    /// Insert a new user. Fails with `AlreadyExists` if present.
    fn insert_user(&self, user: User) -> StoreFuture<'_, User>;

    /// Compare-and-swap on `user.version`.
    fn update_user(&self, user: User) -> StoreFuture<'_, User>;

    /// Users whose active journey or favourites include any of `lines`.
    fn users_following(&self, lines: Vec<LineId>) -> StoreFuture<'_, Vec<User>>;
}

/// Run `fut`, turning a timeout into [`StoreError::Transient`].
pub async fn bounded<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Transient(format!(
            "store call timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}

/// Re-run `op` while it fails with a retryable error, at most `attempts`
/// times in total. Each attempt must re-read whatever state it depends on.
pub async fn retry<T, E, F, Fut>(
    operation: &str,
    attempts: u32,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if attempt < attempts && is_retryable(&e) => {
                warn!(operation, attempt, error = %e, "retrying after retryable failure");
                attempt += 1;
            }
            result => return result,
        }
    }
}
