//! Per-(incident, user) delivery dedup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;
use crate::domain::{IncidentId, UserId};

type DeliveryKey = (IncidentId, UserId);

/// Remembers who was told about which incident, for a limited time.
///
/// A delivery is claimed before the push is attempted, so two concurrent
/// dispatches of the same incident can't both notify the same user. A
/// failed push releases its claim.
pub struct DeliveryCache {
    entries: Mutex<HashMap<DeliveryKey, DateTime<Utc>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl DeliveryCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<DeliveryKey, DateTime<Utc>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the right to notify `user` about `incident`.
    ///
    /// Returns `false` if an unexpired claim already exists.
    pub fn try_claim(&self, incident: IncidentId, user: &UserId) -> bool {
        let now = self.clock.now();
        let mut entries = self.entries();
        let key = (incident, user.clone());
        if let Some(&claimed_at) = entries.get(&key) {
            if now - claimed_at < self.ttl {
                return false;
            }
        }
        entries.insert(key, now);
        true
    }

    /// Drop a claim whose push failed so a later dispatch can retry it.
    pub fn release(&self, incident: IncidentId, user: &UserId) {
        self.entries().remove(&(incident, user.clone()));
    }

    /// Whether `user` has an unexpired delivery for `incident`.
    pub fn was_delivered(&self, incident: IncidentId, user: &UserId) -> bool {
        let now = self.clock.now();
        self.entries()
            .get(&(incident, user.clone()))
            .is_some_and(|&at| now - at < self.ttl)
    }

    /// Remove expired entries. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, &mut at| now - at < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
