//! Incident events and user notifications.
//!
//! Every published incident produces bus events. Pushes to individual users
//! are gated for crowd-sourced incidents: they go out only when the
//! reporters behind the incident are trusted enough, or numerous enough.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::dedup::DeliveryCache;
use crate::clock::Clock;
use crate::domain::{
    Incident, IncidentId, IncidentKind, IncidentStatus, LineId, PendingIncidentReport, UserId,
};
use crate::error::ErrorKind;
use crate::store::{DocumentStore, StoreError};

/// Error from event publishing or push delivery.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NotifyError {
    #[error("event bus rejected event: {0}")]
    Publish(String),

    #[error("push to {user} failed: {reason}")]
    Push { user: UserId, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl NotifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NotifyError::Publish(_) | NotifyError::Push { .. } => ErrorKind::Transient,
            NotifyError::Store(e) => e.kind(),
        }
    }
}

/// Event published to the outbound bus.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum IncidentEvent {
    IncidentCreated {
        incident: Incident,
    },
    IncidentUpdated {
        incident: Incident,
    },
    /// Scoped to one line so subscribers can filter cheaply.
    LineIncidentUpdate {
        line_id: LineId,
        incident_id: IncidentId,
        status: IncidentStatus,
    },
}

/// Outbound event transport.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: IncidentEvent) -> BoxFuture<'_, Result<(), NotifyError>>;
}

/// Push delivery to a single user.
pub trait Notifier: Send + Sync {
    fn push(&self, user: UserId, notification: Notification) -> BoxFuture<'_, Result<(), NotifyError>>;
}

/// Content of a push notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub incident_id: IncidentId,
    pub kind: IncidentKind,
    pub title: String,
    pub line_ids: Vec<LineId>,
}

impl From<&Incident> for Notification {
    fn from(incident: &Incident) -> Self {
        Self {
            incident_id: incident.id,
            kind: incident.kind,
            title: incident.title.clone(),
            line_ids: incident.line_ids.clone(),
        }
    }
}

/// In-process publisher backed by a tokio broadcast channel.
#[derive(Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<IncidentEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IncidentEvent> {
        self.sender.subscribe()
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: IncidentEvent) -> BoxFuture<'_, Result<(), NotifyError>> {
        Box::pin(async move {
            // No subscribers is not a failure
            if self.sender.send(event).is_err() {
                debug!("incident event dropped, no subscribers");
            }
            Ok(())
        })
    }
}

/// Notifier that only logs; stands in for a push gateway.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn push(&self, user: UserId, notification: Notification) -> BoxFuture<'_, Result<(), NotifyError>> {
        Box::pin(async move {
            info!(user = %user, incident = %notification.incident_id, title = %notification.title, "push notification");
            Ok(())
        })
    }
}

/// Tunables for notification gating and dedup.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    /// How long a delivery suppresses repeats (seconds).
    pub delivery_ttl_secs: i64,

    /// Mean reporter trust that opens the gate on its own.
    pub min_aggregate_trust: f64,

    /// Distinct reporters across similar reports that open the gate on their own.
    pub min_similar_reporters: usize,

    /// How far back similar reports are looked for (hours).
    pub similar_window_hours: i64,

    /// Capacity of the in-process event channel.
    pub event_buffer: usize,
}

impl NotificationConfig {
    pub fn delivery_ttl(&self) -> Duration {
        Duration::seconds(self.delivery_ttl_secs)
    }

    pub fn similar_window(&self) -> Duration {
        Duration::hours(self.similar_window_hours)
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            delivery_ttl_secs: 3600, // 1 hour
            min_aggregate_trust: 1.2,
            min_similar_reporters: 3,
            similar_window_hours: 24,
            event_buffer: 256,
        }
    }
}

/// Where a newly published incident came from.
#[derive(Debug, Clone, Copy)]
pub enum Provenance<'a> {
    /// Created or approved by staff: never gated.
    Staff,
    /// Promoted automatically from crowd reports.
    Crowd(&'a PendingIncidentReport),
}

/// Trust evidence behind a crowd-sourced incident.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GateDecision {
    pub aggregate_trust: f64,
    pub similar_reporters: usize,
    pub open: bool,
}

/// What a dispatch did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchReport {
    pub events_published: usize,
    pub events_failed: usize,
    /// Present for crowd-sourced incidents.
    pub gate: Option<GateDecision>,
    pub recipients: usize,
    pub delivered: usize,
    pub duplicates: usize,
    pub failed: usize,
}

/// Decides whether and whom to notify about incidents.
pub struct NotificationDispatcher {
    store: Arc<dyn DocumentStore>,
    publisher: Arc<dyn EventPublisher>,
    notifier: Arc<dyn Notifier>,
    deliveries: DeliveryCache,
    clock: Arc<dyn Clock>,
    config: NotificationConfig,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        publisher: Arc<dyn EventPublisher>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: NotificationConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            notifier,
            deliveries: DeliveryCache::new(config.delivery_ttl(), clock.clone()),
            clock,
            config,
        }
    }

    pub fn deliveries(&self) -> &DeliveryCache {
        &self.deliveries
    }

    /// Announce a newly published incident and notify followers of its lines.
    pub async fn dispatch_created(
        &self,
        incident: &Incident,
        provenance: Provenance<'_>,
    ) -> Result<DispatchReport, NotifyError> {
        let mut report = DispatchReport::default();
        self.publish_all(
            IncidentEvent::IncidentCreated {
                incident: incident.clone(),
            },
            incident,
            &mut report,
        )
        .await;

        if let Provenance::Crowd(pending) = provenance {
            let gate = self.crowd_gate(pending).await?;
            report.gate = Some(gate);
            if !gate.open {
                info!(
                    incident = %incident.id,
                    aggregate_trust = gate.aggregate_trust,
                    similar_reporters = gate.similar_reporters,
                    "crowd incident below notification gate, pushes suppressed"
                );
                return Ok(report);
            }
        }

        self.push_to_followers(incident, &mut report).await?;
        info!(
            incident = %incident.id,
            recipients = report.recipients,
            delivered = report.delivered,
            duplicates = report.duplicates,
            failed = report.failed,
            "incident dispatched"
        );
        Ok(report)
    }

    /// Announce a status change (e.g. resolution). No pushes.
    pub async fn dispatch_updated(&self, incident: &Incident) -> DispatchReport {
        let mut report = DispatchReport::default();
        self.publish_all(
            IncidentEvent::IncidentUpdated {
                incident: incident.clone(),
            },
            incident,
            &mut report,
        )
        .await;
        report
    }

    /// Publish `headline` plus one line-scoped event per affected line.
    async fn publish_all(&self, headline: IncidentEvent, incident: &Incident, report: &mut DispatchReport) {
        let line_events = incident.line_ids.iter().map(|line| IncidentEvent::LineIncidentUpdate {
            line_id: line.clone(),
            incident_id: incident.id,
            status: incident.status,
        });

        for event in std::iter::once(headline).chain(line_events) {
            match self.publisher.publish(event).await {
                Ok(()) => report.events_published += 1,
                Err(e) => {
                    warn!(incident = %incident.id, error = %e, "failed to publish incident event");
                    report.events_failed += 1;
                }
            }
        }
    }

    /// Mean trust and reporter count across `pending` and similar recent
    /// reports (same kind, overlapping line).
    pub async fn crowd_gate(&self, pending: &PendingIncidentReport) -> Result<GateDecision, NotifyError> {
        let since = self.clock.now() - self.config.similar_window();
        let similar = self.store.pending_since(since).await?;

        let mut trust_by_user: HashMap<&UserId, f64> = pending
            .reporter_ids
            .iter()
            .zip(&pending.reporter_trust)
            .map(|(user, &trust)| (user, trust))
            .collect();

        for other in similar
            .iter()
            .filter(|p| p.id != pending.id && p.kind == pending.kind)
            .filter(|p| p.shares_line_with(&pending.line_ids))
        {
            for (user, &trust) in other.reporter_ids.iter().zip(&other.reporter_trust) {
                trust_by_user.entry(user).or_insert(trust);
            }
        }

        let similar_reporters = trust_by_user.len();
        let aggregate_trust = if similar_reporters == 0 {
            0.0
        } else {
            trust_by_user.values().sum::<f64>() / similar_reporters as f64
        };

        Ok(GateDecision {
            aggregate_trust,
            similar_reporters,
            open: aggregate_trust >= self.config.min_aggregate_trust
                || similar_reporters >= self.config.min_similar_reporters,
        })
    }

    async fn push_to_followers(&self, incident: &Incident, report: &mut DispatchReport) -> Result<(), NotifyError> {
        let recipients = self.store.users_following(incident.line_ids.clone()).await?;
        report.recipients = recipients.len();
        let notification = Notification::from(incident);

        for user in recipients {
            if !self.deliveries.try_claim(incident.id, &user.id) {
                report.duplicates += 1;
                continue;
            }
            match self.notifier.push(user.id.clone(), notification.clone()).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(user = %user.id, incident = %incident.id, error = %e, "push failed");
                    self.deliveries.release(incident.id, &user.id);
                    report.failed += 1;
                }
            }
        }
        Ok(())
    }

    /// Sweep expired delivery records. Returns how many were removed.
    pub fn evict_deliveries(&self) -> usize {
        let evicted = self.deliveries.evict_expired();
        if evicted > 0 {
            debug!(evicted, "evicted expired delivery records");
        }
        evicted
    }
}
