//! Trust service: lazy trust reads, reputation updates, periodic recompute.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, warn};

use super::score::{ReportHistory, TrustConfig, apply_delta, compute_trust, reputation_delta};
use crate::clock::Clock;
use crate::domain::{TrustBreakdown, User, UserId};
use crate::store::{DocumentStore, StoreError, retry};
use crate::sweep::Shutdown;

/// Owns every write to a user's reputation and trust breakdown.
#[derive(Clone)]
pub struct TrustService {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    config: TrustConfig,
}

impl TrustService {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, config: TrustConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    /// Report tallies for `user` within the history window.
    pub async fn history(&self, user: &UserId) -> Result<ReportHistory, StoreError> {
        let since = self.clock.now() - self.config.history_window();
        let records = self.store.records_for_user_since(user.clone(), since).await?;
        Ok(ReportHistory::from_records(&records))
    }

    async fn breakdown(&self, user: &UserId, reputation: u32) -> Result<TrustBreakdown, StoreError> {
        let history = self.history(user).await?;
        Ok(compute_trust(reputation, &history, &self.config, self.clock.now()))
    }

    /// Current trust score of `user`.
    ///
    /// Computed and stored on first read. Users the store doesn't know yet
    /// are scored from `fallback_reputation` without being created.
    pub async fn trust_score(&self, user: &UserId, fallback_reputation: u32) -> Result<f64, StoreError> {
        Ok(self.standing(user, fallback_reputation).await?.1)
    }

    /// Reputation and trust score of `user`.
    ///
    /// The stored reputation always wins; `fallback_reputation` only stands
    /// in for users the store doesn't know yet.
    pub async fn standing(&self, user: &UserId, fallback_reputation: u32) -> Result<(u32, f64), StoreError> {
        let mut stored = match self.store.get_user(user.clone()).await {
            Ok(u) => u,
            Err(StoreError::NotFound { .. }) => {
                let score = self.breakdown(user, fallback_reputation).await?.score;
                return Ok((fallback_reputation, score));
            }
            Err(e) => return Err(e),
        };

        if let Some(score) = stored.trust_score() {
            return Ok((stored.reputation, score));
        }

        let reputation = stored.reputation;
        let breakdown = self.breakdown(user, reputation).await?;
        let score = breakdown.score;
        stored.trust = Some(breakdown);
        // Another writer got there first; their value is at least as fresh
        if let Err(e) = self.store.update_user(stored).await {
            debug!(user = %user, error = %e, "trust score not cached");
        }
        Ok((reputation, score))
    }

    /// Adjust reputation after one of `user`'s reports was judged, then
    /// refresh the derived trust score.
    ///
    /// Users missing from the store are created with `fallback_reputation`.
    pub async fn apply_resolution(
        &self,
        user: &UserId,
        correct: bool,
        resolved_after: Duration,
        fallback_reputation: u32,
    ) -> Result<User, StoreError> {
        retry(
            "apply resolution",
            self.config.max_attempts,
            StoreError::is_retryable,
            move || self.try_apply_resolution(user, correct, resolved_after, fallback_reputation),
        )
        .await
    }

    async fn try_apply_resolution(
        &self,
        user: &UserId,
        correct: bool,
        resolved_after: Duration,
        fallback_reputation: u32,
    ) -> Result<User, StoreError> {
        let current = self.load_or_create(user, fallback_reputation).await?;

        let delta = reputation_delta(current.reputation, correct, resolved_after, &self.config);
        let mut next = current.clone();
        next.reputation = apply_delta(current.reputation, delta);
        next.trust = Some(self.breakdown(user, next.reputation).await?);

        let stored = self.store.update_user(next).await?;
        info!(
            user = %user,
            correct,
            delta,
            reputation = stored.reputation,
            trust = stored.trust_score().unwrap_or_default(),
            "reputation updated"
        );
        Ok(stored)
    }

    async fn load_or_create(&self, user: &UserId, reputation: u32) -> Result<User, StoreError> {
        match self.store.get_user(user.clone()).await {
            Ok(u) => Ok(u),
            Err(StoreError::NotFound { .. }) => {
                match self.store.insert_user(User::new(user.clone(), reputation)).await {
                    // Created concurrently; start over from a fresh read
                    Err(StoreError::AlreadyExists { entity, id }) => {
                        Err(StoreError::VersionConflict { entity, id })
                    }
                    other => other,
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Recompute the trust breakdown of everyone who has ever reported.
    ///
    /// Stops early when `shutdown` fires. Returns how many users were updated.
    pub async fn recompute_all(&self, shutdown: &Shutdown) -> Result<usize, StoreError> {
        let ids = self.store.reporter_ids().await?;
        let mut updated = 0;

        for id in ids {
            if shutdown.is_triggered() {
                info!(updated, "trust recompute interrupted by shutdown");
                break;
            }
            match self.recompute(&id).await {
                Ok(true) => updated += 1,
                Ok(false) => {}
                Err(e) => warn!(user = %id, error = %e, "trust recompute failed"),
            }
        }

        info!(updated, "trust recompute finished");
        Ok(updated)
    }

    /// Recompute one user's breakdown. `false` when the user is unknown.
    async fn recompute(&self, user: &UserId) -> Result<bool, StoreError> {
        retry("recompute trust", self.config.max_attempts, StoreError::is_retryable, move || async move {
            let mut stored = match self.store.get_user(user.clone()).await {
                Ok(u) => u,
                Err(StoreError::NotFound { .. }) => return Ok(false),
                Err(e) => return Err(e),
            };
            stored.trust = Some(self.breakdown(user, stored.reputation).await?);
            self.store.update_user(stored).await?;
            Ok(true)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::{PendingId, ReportOutcome, ReportRecord};
    use crate::store::MemoryStore;
    use chrono::{DateTime, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap()
    }

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    fn service() -> (TrustService, MemoryStore, Arc<ManualClock>) {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(t0()));
        let svc = TrustService::new(Arc::new(store.clone()), clock.clone(), TrustConfig::default());
        (svc, store, clock)
    }

    #[tokio::test]
    async fn unknown_user_scored_from_fallback() {
        let (svc, store, _) = service();
        let score = svc.trust_score(&uid("new"), 150).await.unwrap();
        // base 1.5 + high-rep 1.5 × 0.25 × 0.5
        assert!((score - 1.6875).abs() < 1e-9);
        assert!(store.get_user(uid("new")).await.is_err());
    }

    #[tokio::test]
    async fn trust_is_computed_lazily_and_cached() {
        let (svc, store, _) = service();
        store.insert_user(User::new(uid("u1"), 80)).await.unwrap();

        let score = svc.trust_score(&uid("u1"), 0).await.unwrap();
        assert!((score - 0.8).abs() < 1e-9);

        let stored = store.get_user(uid("u1")).await.unwrap();
        assert_eq!(stored.trust_score(), Some(score));
    }

    #[tokio::test]
    async fn stored_reputation_outranks_fallback() {
        let (svc, store, _) = service();
        store.insert_user(User::new(uid("newbie"), 0)).await.unwrap();

        let (reputation, score) = svc.standing(&uid("newbie"), 500).await.unwrap();
        assert_eq!(reputation, 0);
        assert_eq!(score, 0.5);

        let (reputation, _) = svc.standing(&uid("stranger"), 40).await.unwrap();
        assert_eq!(reputation, 40);
    }

    #[tokio::test]
    async fn resolution_updates_reputation_then_trust() {
        let (svc, store, _) = service();
        store.insert_user(User::new(uid("u1"), 90)).await.unwrap();

        let mut record = ReportRecord::new(uid("u1"), PendingId::new(), t0());
        record.outcome = ReportOutcome::Validated;
        store.insert_record(record).await.unwrap();

        let user = svc
            .apply_resolution(&uid("u1"), true, Duration::minutes(30), 0)
            .await
            .unwrap();
        // 10 × 0.91 = 9.1 → 9
        assert_eq!(user.reputation, 99);
        let trust = user.trust.unwrap();
        assert_eq!(trust.validation_rate, 1.0);
        assert!((trust.score - (0.99 + 0.3)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn resolution_creates_missing_user() {
        let (svc, store, _) = service();
        let user = svc
            .apply_resolution(&uid("ghost"), false, Duration::minutes(1), 3)
            .await
            .unwrap();
        assert_eq!(user.reputation, 0);
        assert_eq!(store.get_user(uid("ghost")).await.unwrap().reputation, 0);
    }

    #[tokio::test]
    async fn resolution_retries_transient_failures() {
        let (svc, store, _) = service();
        store.insert_user(User::new(uid("u1"), 0)).await.unwrap();
        store.fail_next(1);

        let user = svc
            .apply_resolution(&uid("u1"), true, Duration::minutes(30), 0)
            .await
            .unwrap();
        assert_eq!(user.reputation, 10);
    }

    #[tokio::test]
    async fn recompute_refreshes_reporters_only() {
        let (svc, store, clock) = service();
        store.insert_user(User::new(uid("u1"), 100)).await.unwrap();
        store.insert_user(User::new(uid("lurker"), 100)).await.unwrap();
        store
            .insert_record(ReportRecord::new(uid("u1"), PendingId::new(), t0()))
            .await
            .unwrap();

        clock.advance(Duration::days(1));
        let (_tx, shutdown) = Shutdown::new();
        assert_eq!(svc.recompute_all(&shutdown).await.unwrap(), 1);

        let u1 = store.get_user(uid("u1")).await.unwrap();
        assert_eq!(u1.trust.unwrap().updated_at, t0() + Duration::days(1));
        assert!(store.get_user(uid("lurker")).await.unwrap().trust.is_none());
    }

    #[tokio::test]
    async fn recompute_stops_on_shutdown() {
        let (svc, store, _) = service();
        store.insert_user(User::new(uid("u1"), 100)).await.unwrap();
        store
            .insert_record(ReportRecord::new(uid("u1"), PendingId::new(), t0()))
            .await
            .unwrap();

        let (trigger, shutdown) = Shutdown::new();
        trigger.trigger();
        assert_eq!(svc.recompute_all(&shutdown).await.unwrap(), 0);
    }
}
