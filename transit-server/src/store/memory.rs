//! In-memory document store.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{DocumentStore, StoreError, StoreFuture};
use crate::domain::{
    Incident, IncidentId, LineId, ModeratorQueueItem, PendingId, PendingIncidentReport,
    PendingStatus, ReportRecord, User, UserId,
};

#[derive(Debug, Default)]
struct Tables {
    incidents: HashMap<IncidentId, Incident>,
    pending: HashMap<PendingId, PendingIncidentReport>,
    records: Vec<ReportRecord>,
    queue: Vec<ModeratorQueueItem>,
    users: HashMap<UserId, User>,
}

/// Thread-safe in-memory store.
///
/// All tables sit behind one lock, so each call is atomic with respect to
/// every other call. Cloning shares the underlying tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    failures: Arc<AtomicU32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls fail with [`StoreError::Transient`].
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match injected {
            Ok(_) => Err(StoreError::Transient("injected failure".to_string())),
            Err(_) => Ok(()),
        }
    }
}

impl DocumentStore for MemoryStore {
    fn active_incidents(&self) -> StoreFuture<'_, Vec<Incident>> {
        Box::pin(async move {
            self.check_available()?;
            let tables = self.tables.read().await;
            Ok(tables
                .incidents
                .values()
                .filter(|i| i.is_active())
                .cloned()
                .collect())
        })
    }

    fn get_incident(&self, id: IncidentId) -> StoreFuture<'_, Incident> {
        Box::pin(async move {
            self.check_available()?;
            let tables = self.tables.read().await;
            tables
                .incidents
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("incident", id))
        })
    }

    fn put_incident(&self, incident: Incident) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.check_available()?;
            let mut tables = self.tables.write().await;
            tables.incidents.insert(incident.id, incident);
            Ok(())
        })
    }

    fn insert_incident(&self, incident: Incident) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.check_available()?;
            let mut tables = self.tables.write().await;
            if tables.incidents.contains_key(&incident.id) {
                return Err(StoreError::AlreadyExists {
                    entity: "incident",
                    id: incident.id.to_string(),
                });
            }
            tables.incidents.insert(incident.id, incident);
            Ok(())
        })
    }

    fn get_pending(&self, id: PendingId) -> StoreFuture<'_, PendingIncidentReport> {
        Box::pin(async move {
            self.check_available()?;
            let tables = self.tables.read().await;
            tables
                .pending
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("pending report", id))
        })
    }

    fn pending_by_status(
        &self,
        status: PendingStatus,
    ) -> StoreFuture<'_, Vec<PendingIncidentReport>> {
        Box::pin(async move {
            self.check_available()?;
            let tables = self.tables.read().await;
            let mut found: Vec<PendingIncidentReport> = tables
                .pending
                .values()
                .filter(|p| p.status == status)
                .cloned()
                .collect();
            found.sort_by_key(|p| p.created_at);
            Ok(found)
        })
    }

    fn pending_since(&self, since: DateTime<Utc>) -> StoreFuture<'_, Vec<PendingIncidentReport>> {
        Box::pin(async move {
            self.check_available()?;
            let tables = self.tables.read().await;
            Ok(tables
                .pending
                .values()
                .filter(|p| p.last_report_at >= since)
                .cloned()
                .collect())
        })
    }

    fn insert_pending(
        &self,
        mut report: PendingIncidentReport,
    ) -> StoreFuture<'_, PendingIncidentReport> {
        Box::pin(async move {
            self.check_available()?;
            let mut tables = self.tables.write().await;
            if tables.pending.contains_key(&report.id) {
                return Err(StoreError::AlreadyExists {
                    entity: "pending report",
                    id: report.id.to_string(),
                });
            }
            report.version = 1;
            tables.pending.insert(report.id, report.clone());
            Ok(report)
        })
    }

    fn update_pending(
        &self,
        mut report: PendingIncidentReport,
    ) -> StoreFuture<'_, PendingIncidentReport> {
        Box::pin(async move {
            self.check_available()?;
            let mut tables = self.tables.write().await;
            let stored = tables
                .pending
                .get_mut(&report.id)
                .ok_or_else(|| StoreError::not_found("pending report", report.id))?;
            if stored.version != report.version {
                return Err(StoreError::VersionConflict {
                    entity: "pending report",
                    id: report.id.to_string(),
                });
            }
            report.version += 1;
            *stored = report.clone();
            Ok(report)
        })
    }

    fn insert_record(&self, record: ReportRecord) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.check_available()?;
            let mut tables = self.tables.write().await;
            let exists = tables
                .records
                .iter()
                .any(|r| r.user_id == record.user_id && r.pending_id == record.pending_id);
            if exists {
                return Err(StoreError::AlreadyExists {
                    entity: "report record",
                    id: format!("{}/{}", record.pending_id, record.user_id),
                });
            }
            tables.records.push(record);
            Ok(())
        })
    }

    fn resolve_record(&self, record: ReportRecord) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            self.check_available()?;
            let mut tables = self.tables.write().await;
            let stored = tables
                .records
                .iter_mut()
                .find(|r| r.user_id == record.user_id && r.pending_id == record.pending_id);
            match stored {
                Some(stored) if stored.is_resolved() => Ok(false),
                Some(stored) => {
                    *stored = record;
                    Ok(true)
                }
                None => {
                    tables.records.push(record);
                    Ok(true)
                }
            }
        })
    }

    fn records_for_pending(&self, id: PendingId) -> StoreFuture<'_, Vec<ReportRecord>> {
        Box::pin(async move {
            self.check_available()?;
            let tables = self.tables.read().await;
            Ok(tables
                .records
                .iter()
                .filter(|r| r.pending_id == id)
                .cloned()
                .collect())
        })
    }

    fn records_for_user_since(
        &self,
        user: UserId,
        since: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<ReportRecord>> {
        Box::pin(async move {
            self.check_available()?;
            let tables = self.tables.read().await;
            Ok(tables
                .records
                .iter()
                .filter(|r| r.user_id == user && r.submitted_at >= since)
                .cloned()
                .collect())
        })
    }

    fn reporter_ids(&self) -> StoreFuture<'_, Vec<UserId>> {
        Box::pin(async move {
            self.check_available()?;
            let tables = self.tables.read().await;
            let ids: BTreeSet<&UserId> = tables.records.iter().map(|r| &r.user_id).collect();
            Ok(ids.into_iter().cloned().collect())
        })
    }

    fn enqueue_moderation(&self, item: ModeratorQueueItem) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            self.check_available()?;
            let mut tables = self.tables.write().await;
            let already_open = tables
                .queue
                .iter()
                .any(|q| q.pending_id == item.pending_id && q.is_open());
            if already_open {
                return Ok(false);
            }
            tables.queue.push(item);
            Ok(true)
        })
    }

    fn archive_moderation(
        &self,
        pending: PendingId,
        reviewed_by: Option<UserId>,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            self.check_available()?;
            let mut tables = self.tables.write().await;
            let mut archived = false;
            for item in tables
                .queue
                .iter_mut()
                .filter(|q| q.pending_id == pending && q.is_open())
            {
                item.reviewed_at = Some(at);
                item.reviewed_by = reviewed_by.clone();
                item.notes = notes.clone();
                archived = true;
            }
            Ok(archived)
        })
    }

    fn open_moderation_items(&self) -> StoreFuture<'_, Vec<ModeratorQueueItem>> {
        Box::pin(async move {
            self.check_available()?;
            let tables = self.tables.read().await;
            let mut open: Vec<ModeratorQueueItem> =
                tables.queue.iter().filter(|q| q.is_open()).cloned().collect();
            open.sort_by_key(|q| (q.priority, q.created_at));
            Ok(open)
        })
    }

    fn get_user(&self, id: UserId) -> StoreFuture<'_, User> {
        Box::pin(async move {
            self.check_available()?;
            let tables = self.tables.read().await;
            tables
                .users
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("user", id))
        })
    }

    fn insert_user(&self, mut user: User) -> StoreFuture<'_, User> {
        Box::pin(async move {
            self.check_available()?;
            let mut tables = self.tables.write().await;
            if tables.users.contains_key(&user.id) {
                return Err(StoreError::AlreadyExists {
                    entity: "user",
                    id: user.id.to_string(),
                });
            }
            user.version = 1;
            tables.users.insert(user.id.clone(), user.clone());
            Ok(user)
        })
    }

    fn update_user(&self, mut user: User) -> StoreFuture<'_, User> {
        Box::pin(async move {
            self.check_available()?;
            let mut tables = self.tables.write().await;
            let stored = tables
                .users
                .get_mut(&user.id)
                .ok_or_else(|| StoreError::not_found("user", &user.id))?;
            if stored.version != user.version {
                return Err(StoreError::VersionConflict {
                    entity: "user",
                    id: user.id.to_string(),
                });
            }
            user.version += 1;
            *stored = user.clone();
            Ok(user)
        })
    }

    fn users_following(&self, lines: Vec<LineId>) -> StoreFuture<'_, Vec<User>> {
        Box::pin(async move {
            self.check_available()?;
            let tables = self.tables.read().await;
            let mut users: Vec<User> = tables
                .users
                .values()
                .filter(|u| u.follows_any(&lines))
                .cloned()
                .collect();
            users.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(users)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IncidentKind, IncidentSource, Priority, ReportOutcome};
    use crate::geo::GeoPoint;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap()
    }

    fn user(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    fn pending() -> PendingIncidentReport {
        PendingIncidentReport::open(
            IncidentKind::Accident,
            GeoPoint::new(51.5, -0.1).unwrap(),
            vec![LineId::parse("L1").unwrap()],
            now(),
            Duration::hours(24),
        )
    }

    #[tokio::test]
    async fn pending_update_is_compare_and_swap() {
        let store = MemoryStore::new();
        let stored = store.insert_pending(pending()).await.unwrap();
        assert_eq!(stored.version, 1);

        // Two writers read the same version
        let mut first = stored.clone();
        let mut second = stored.clone();
        first.current_score = 0.5;
        second.current_score = 0.9;

        let first = store.update_pending(first).await.unwrap();
        assert_eq!(first.version, 2);

        let err = store.update_pending(second).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));

        let current = store.get_pending(stored.id).await.unwrap();
        assert_eq!(current.current_score, 0.5);
    }

    #[tokio::test]
    async fn user_update_is_compare_and_swap() {
        let store = MemoryStore::new();
        let u = store.insert_user(User::new(user("u1"), 50)).await.unwrap();

        let mut stale = u.clone();
        let mut fresh = u.clone();
        fresh.reputation = 60;
        store.update_user(fresh).await.unwrap();

        stale.reputation = 70;
        assert!(store.update_user(stale).await.is_err());
        assert_eq!(store.get_user(user("u1")).await.unwrap().reputation, 60);
    }

    #[tokio::test]
    async fn missing_entities_are_not_found() {
        let store = MemoryStore::new();
        let err = store.get_user(user("ghost")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "user", .. }));
        assert!(store.get_pending(PendingId::new()).await.is_err());
        assert!(store.get_incident(IncidentId::new()).await.is_err());
    }

    #[tokio::test]
    async fn moderation_enqueue_is_idempotent() {
        let store = MemoryStore::new();
        let id = PendingId::new();

        let item = ModeratorQueueItem::new(id, Priority::Medium, "near threshold", now());
        assert!(store.enqueue_moderation(item.clone()).await.unwrap());
        assert!(!store.enqueue_moderation(item.clone()).await.unwrap());
        assert_eq!(store.open_moderation_items().await.unwrap().len(), 1);

        assert!(
            store
                .archive_moderation(id, Some(user("mod")), None, now())
                .await
                .unwrap()
        );
        assert!(store.open_moderation_items().await.unwrap().is_empty());

        // Once archived a fresh item may be queued again
        assert!(store.enqueue_moderation(item).await.unwrap());
    }

    #[tokio::test]
    async fn queue_ordered_by_priority_then_age() {
        let store = MemoryStore::new();
        let low = ModeratorQueueItem::new(PendingId::new(), Priority::Low, "old", now());
        let high = ModeratorQueueItem::new(
            PendingId::new(),
            Priority::High,
            "new",
            now() + Duration::minutes(5),
        );
        store.enqueue_moderation(low).await.unwrap();
        store.enqueue_moderation(high).await.unwrap();

        let open = store.open_moderation_items().await.unwrap();
        assert_eq!(open[0].priority, Priority::High);
        assert_eq!(open[1].priority, Priority::Low);
    }

    #[tokio::test]
    async fn only_published_incidents_are_active() {
        let store = MemoryStore::new();
        let source = IncidentSource::Staff {
            created_by: user("admin"),
        };
        let live = Incident::published(IncidentKind::Accident, vec![], source.clone(), now());
        let mut gone = Incident::published(IncidentKind::Accident, vec![], source, now());
        gone.resolve(now()).unwrap();

        store.put_incident(live.clone()).await.unwrap();
        store.put_incident(gone).await.unwrap();

        let active = store.active_incidents().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, live.id);
    }

    #[tokio::test]
    async fn records_and_reporters() {
        let store = MemoryStore::new();
        let p = PendingId::new();
        store
            .insert_record(ReportRecord::new(user("u1"), p, now()))
            .await
            .unwrap();
        store
            .insert_record(ReportRecord::new(user("u2"), p, now() - Duration::days(40)))
            .await
            .unwrap();
        assert!(
            store
                .insert_record(ReportRecord::new(user("u1"), p, now()))
                .await
                .is_err()
        );

        assert_eq!(store.records_for_pending(p).await.unwrap().len(), 2);
        assert_eq!(store.reporter_ids().await.unwrap(), vec![user("u1"), user("u2")]);

        let recent = store
            .records_for_user_since(user("u2"), now() - Duration::days(30))
            .await
            .unwrap();
        assert!(recent.is_empty());
    }

    #[tokio::test]
    async fn incident_insert_refuses_existing_id() {
        let store = MemoryStore::new();
        let source = IncidentSource::Staff {
            created_by: user("admin"),
        };
        let incident = Incident::published(IncidentKind::Accident, vec![], source, now());

        store.insert_incident(incident.clone()).await.unwrap();
        let err = store.insert_incident(incident.clone()).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { entity: "incident", .. }));

        // Replacing is still allowed
        store.put_incident(incident).await.unwrap();
    }

    #[tokio::test]
    async fn record_verdict_is_claimed_once() {
        let store = MemoryStore::new();
        let p = PendingId::new();
        store
            .insert_record(ReportRecord::new(user("u1"), p, now()))
            .await
            .unwrap();

        let verdict = |outcome| ReportRecord {
            outcome,
            resolved_at: Some(now()),
            ..ReportRecord::new(user("u1"), p, now())
        };
        assert!(store.resolve_record(verdict(ReportOutcome::Validated)).await.unwrap());
        assert!(!store.resolve_record(verdict(ReportOutcome::Rejected)).await.unwrap());

        let records = store.records_for_pending(p).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, ReportOutcome::Validated);

        // A reporter without a record gets one holding the verdict
        let missing = ReportRecord {
            outcome: ReportOutcome::Rejected,
            resolved_at: Some(now()),
            ..ReportRecord::new(user("u2"), p, now())
        };
        assert!(store.resolve_record(missing).await.unwrap());
        assert_eq!(store.records_for_pending(p).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn users_following_matches_active_and_favourite_lines() {
        let store = MemoryStore::new();
        let l1 = LineId::parse("L1").unwrap();

        let mut commuter = User::new(user("a"), 10);
        commuter.active_journey_lines = vec![l1.clone()];
        let mut fan = User::new(user("b"), 10);
        fan.favorite_lines = vec![l1.clone()];
        let stranger = User::new(user("c"), 10);

        for u in [commuter, fan, stranger] {
            store.insert_user(u).await.unwrap();
        }

        let following = store.users_following(vec![l1]).await.unwrap();
        let ids: Vec<&str> = following.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[tokio::test]
    async fn injected_failures_are_transient_and_run_out() {
        let store = MemoryStore::new();
        store.fail_next(2);

        for _ in 0..2 {
            let err = store.active_incidents().await.unwrap_err();
            assert!(err.is_retryable());
        }
        assert!(store.active_incidents().await.is_ok());
    }
}
