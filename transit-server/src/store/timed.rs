//! Timeout-bounding wrapper around another store.
//!
//! Every call is raced against a fixed deadline; a call that overruns
//! surfaces as [`StoreError::Transient`] so the caller's retry policy
//! applies to slow stores the same way it does to unavailable ones.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{DocumentStore, StoreFuture, bounded};
use crate::domain::{
    Incident, IncidentId, LineId, ModeratorQueueItem, PendingId, PendingIncidentReport,
    PendingStatus, ReportRecord, User, UserId,
};

/// Store decorator applying a per-call timeout.
#[derive(Clone)]
pub struct TimedStore {
    inner: Arc<dyn DocumentStore>,
    timeout: Duration,
}

impl TimedStore {
    pub fn new(inner: Arc<dyn DocumentStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl DocumentStore for TimedStore {
    fn active_incidents(&self) -> StoreFuture<'_, Vec<Incident>> {
        Box::pin(bounded(self.timeout, self.inner.active_incidents()))
    }

    fn get_incident(&self, id: IncidentId) -> StoreFuture<'_, Incident> {
        Box::pin(bounded(self.timeout, self.inner.get_incident(id)))
    }

    fn put_incident(&self, incident: Incident) -> StoreFuture<'_, ()> {
        Box::pin(bounded(self.timeout, self.inner.put_incident(incident)))
    }

    fn insert_incident(&self, incident: Incident) -> StoreFuture<'_, ()> {
        Box::pin(bounded(self.timeout, self.inner.insert_incident(incident)))
    }

    fn get_pending(&self, id: PendingId) -> StoreFuture<'_, PendingIncidentReport> {
        Box::pin(bounded(self.timeout, self.inner.get_pending(id)))
    }

    fn pending_by_status(
        &self,
        status: PendingStatus,
    ) -> StoreFuture<'_, Vec<PendingIncidentReport>> {
        Box::pin(bounded(self.timeout, self.inner.pending_by_status(status)))
    }

    fn pending_since(&self, since: DateTime<Utc>) -> StoreFuture<'_, Vec<PendingIncidentReport>> {
        Box::pin(bounded(self.timeout, self.inner.pending_since(since)))
    }

    fn insert_pending(
        &self,
        report: PendingIncidentReport,
    ) -> StoreFuture<'_, PendingIncidentReport> {
        Box::pin(bounded(self.timeout, self.inner.insert_pending(report)))
    }

    fn update_pending(
        &self,
        report: PendingIncidentReport,
    ) -> StoreFuture<'_, PendingIncidentReport> {
        Box::pin(bounded(self.timeout, self.inner.update_pending(report)))
    }

    fn insert_record(&self, record: ReportRecord) -> StoreFuture<'_, ()> {
        Box::pin(bounded(self.timeout, self.inner.insert_record(record)))
    }

    fn resolve_record(&self, record: ReportRecord) -> StoreFuture<'_, bool> {
        Box::pin(bounded(self.timeout, self.inner.resolve_record(record)))
    }

    fn records_for_pending(&self, id: PendingId) -> StoreFuture<'_, Vec<ReportRecord>> {
        Box::pin(bounded(self.timeout, self.inner.records_for_pending(id)))
    }

    fn records_for_user_since(
        &self,
        user: UserId,
        since: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<ReportRecord>> {
        Box::pin(bounded(
            self.timeout,
            self.inner.records_for_user_since(user, since),
        ))
    }

    fn reporter_ids(&self) -> StoreFuture<'_, Vec<UserId>> {
        Box::pin(bounded(self.timeout, self.inner.reporter_ids()))
    }

    fn enqueue_moderation(&self, item: ModeratorQueueItem) -> StoreFuture<'_, bool> {
        Box::pin(bounded(self.timeout, self.inner.enqueue_moderation(item)))
    }

    fn archive_moderation(
        &self,
        pending: PendingId,
        reviewed_by: Option<UserId>,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, bool> {
        Box::pin(bounded(
            self.timeout,
            self.inner.archive_moderation(pending, reviewed_by, notes, at),
        ))
    }

    fn open_moderation_items(&self) -> StoreFuture<'_, Vec<ModeratorQueueItem>> {
        Box::pin(bounded(self.timeout, self.inner.open_moderation_items()))
    }

    fn get_user(&self, id: UserId) -> StoreFuture<'_, User> {
        Box::pin(bounded(self.timeout, self.inner.get_user(id)))
    }

    fn insert_user(&self, user: User) -> StoreFuture<'_, User> {
        Box::pin(bounded(self.timeout, self.inner.insert_user(user)))
    }

    fn update_user(&self, user: User) -> StoreFuture<'_, User> {
        Box::pin(bounded(self.timeout, self.inner.update_user(user)))
    }

    fn users_following(&self, lines: Vec<LineId>) -> StoreFuture<'_, Vec<User>> {
        Box::pin(bounded(self.timeout, self.inner.users_following(lines)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError};

    /// Store whose every call hangs.
    struct Stalled;

    impl DocumentStore for Stalled {
        fn active_incidents(&self) -> StoreFuture<'_, Vec<Incident>> {
            Box::pin(futures::future::pending())
        }
        fn get_incident(&self, _: IncidentId) -> StoreFuture<'_, Incident> {
            Box::pin(futures::future::pending())
        }
        fn put_incident(&self, _: Incident) -> StoreFuture<'_, ()> {
            Box::pin(futures::future::pending())
        }
        fn insert_incident(&self, _: Incident) -> StoreFuture<'_, ()> {
            Box::pin(futures::future::pending())
        }
        fn get_pending(&self, _: PendingId) -> StoreFuture<'_, PendingIncidentReport> {
            Box::pin(futures::future::pending())
        }
        fn pending_by_status(&self, _: PendingStatus) -> StoreFuture<'_, Vec<PendingIncidentReport>> {
            Box::pin(futures::future::pending())
        }
        fn pending_since(&self, _: DateTime<Utc>) -> StoreFuture<'_, Vec<PendingIncidentReport>> {
            Box::pin(futures::future::pending())
        }
        fn insert_pending(&self, _: PendingIncidentReport) -> StoreFuture<'_, PendingIncidentReport> {
            Box::pin(futures::future::pending())
        }
        fn update_pending(&self, _: PendingIncidentReport) -> StoreFuture<'_, PendingIncidentReport> {
            Box::pin(futures::future::pending())
        }
        fn insert_record(&self, _: ReportRecord) -> StoreFuture<'_, ()> {
            Box::pin(futures::future::pending())
        }
        fn resolve_record(&self, _: ReportRecord) -> StoreFuture<'_, bool> {
            Box::pin(futures::future::pending())
        }
        fn records_for_pending(&self, _: PendingId) -> StoreFuture<'_, Vec<ReportRecord>> {
            Box::pin(futures::future::pending())
        }
        fn records_for_user_since(&self, _: UserId, _: DateTime<Utc>) -> StoreFuture<'_, Vec<ReportRecord>> {
            Box::pin(futures::future::pending())
        }
        fn reporter_ids(&self) -> StoreFuture<'_, Vec<UserId>> {
            Box::pin(futures::future::pending())
        }
        fn enqueue_moderation(&self, _: ModeratorQueueItem) -> StoreFuture<'_, bool> {
            Box::pin(futures::future::pending())
        }
        fn archive_moderation(
            &self,
            _: PendingId,
            _: Option<UserId>,
            _: Option<String>,
            _: DateTime<Utc>,
        ) -> StoreFuture<'_, bool> {
            Box::pin(futures::future::pending())
        }
        fn open_moderation_items(&self) -> StoreFuture<'_, Vec<ModeratorQueueItem>> {
            Box::pin(futures::future::pending())
        }
        fn get_user(&self, _: UserId) -> StoreFuture<'_, User> {
            Box::pin(futures::future::pending())
        }
        fn insert_user(&self, _: User) -> StoreFuture<'_, User> {
            Box::pin(futures::future::pending())
        }
        fn update_user(&self, _: User) -> StoreFuture<'_, User> {
            Box::pin(futures::future::pending())
        }
        fn users_following(&self, _: Vec<LineId>) -> StoreFuture<'_, Vec<User>> {
            Box::pin(futures::future::pending())
        }
    }

    #[tokio::test]
    async fn stalled_calls_become_transient() {
        let store = TimedStore::new(Arc::new(Stalled), Duration::from_millis(10));
        let err = store.active_incidents().await.unwrap_err();
        assert!(matches!(err, StoreError::Transient(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn healthy_calls_pass_through() {
        let store = TimedStore::new(Arc::new(MemoryStore::new()), Duration::from_secs(1));
        assert!(store.active_incidents().await.unwrap().is_empty());
        assert!(store.reporter_ids().await.unwrap().is_empty());
    }
}
