//! Pending report aggregation, promotion and moderation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::error::QuorumError;
use super::threshold::{ThresholdConfig, ThresholdResult, calculate_threshold};
use crate::clock::Clock;
use crate::domain::{
    Incident, IncidentId, IncidentKind, IncidentSource, LineId, ModeratorQueueItem, PendingId,
    PendingIncidentReport, PendingStatus, Priority, ReportOutcome, ReportRecord, StopId, UserId,
};
use crate::geo::GeoPoint;
use crate::notify::{NotificationDispatcher, Provenance};
use crate::planner::JourneyService;
use crate::store::{DocumentStore, StoreError, retry};
use crate::trust::TrustService;

/// Most candidate lines a single report may name.
const MAX_REPORT_LINES: usize = 16;

const NEAR_THRESHOLD_REASON: &str = "near threshold";

/// One user's report of a disruption.
#[derive(Debug, Clone)]
pub struct ReportSubmission {
    pub kind: IncidentKind,
    pub location: GeoPoint,
    pub line_ids: Vec<LineId>,
    pub reporter_id: UserId,
    /// Reputation to assume for a reporter the store has never seen.
    pub reporter_reputation: u32,
}

/// What happened to a submitted report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitStatus {
    /// Started a new pending report.
    Created,
    /// Joined an existing pending report.
    Joined,
    /// Joined or started a report that is now a published incident.
    ThresholdMet,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitOutcome {
    pub status: SubmitStatus,
    pub pending_id: PendingId,
    /// Quorum score, capped at 1.0.
    pub threshold_progress: f64,
    pub total_reports: usize,
    pub incident_id: Option<IncidentId>,
    pub message: String,
}

/// Result of promoting a pending report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Approval {
    pub incident: Incident,
    pub rewarded_users: Vec<UserId>,
}

/// State written by one successful submission attempt.
struct Committed {
    report: PendingIncidentReport,
    created: bool,
    threshold: ThresholdResult,
}

/// One materialization run.
struct Materialized {
    approval: Approval,
    /// Whether this run stored the incident, and so announced it.
    published: bool,
}

/// Turns crowd reports into incidents.
pub struct QuorumEngine {
    store: Arc<dyn DocumentStore>,
    trust: TrustService,
    dispatcher: Arc<NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    config: ThresholdConfig,
    stops: Option<Arc<JourneyService>>,
}

impl QuorumEngine {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        trust: TrustService,
        dispatcher: Arc<NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        config: ThresholdConfig,
    ) -> Self {
        Self {
            store,
            trust,
            dispatcher,
            clock,
            config,
            stops: None,
        }
    }

    /// Tag promoted incidents with the stop nearest their reports.
    pub fn with_stop_lookup(mut self, journeys: Arc<JourneyService>) -> Self {
        self.stops = Some(journeys);
        self
    }

    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    /// Record a report, joining a matching pending item or opening a new
    /// one, and promote the item if it now meets quorum.
    pub async fn submit_report(&self, submission: ReportSubmission) -> Result<SubmitOutcome, QuorumError> {
        if submission.line_ids.len() > MAX_REPORT_LINES {
            return Err(QuorumError::InvalidInput(format!(
                "at most {MAX_REPORT_LINES} lines per report"
            )));
        }

        let submission = &submission;
        let Committed {
            report,
            created,
            threshold,
        } = retry(
            "submit report",
            self.config.max_attempts,
            QuorumError::is_retryable,
            move || self.try_submit(submission),
        )
        .await?;

        let now = self.clock.now();
        let record = ReportRecord::new(submission.reporter_id.clone(), report.id, now);
        if let Err(e) = self.store.insert_record(record).await {
            warn!(pending = %report.id, user = %submission.reporter_id, error = %e, "failed to store report record");
        }

        debug!(
            pending = %report.id,
            reports = report.total_reports(),
            score = threshold.current_score,
            "report recorded"
        );

        if report.status == PendingStatus::ThresholdMet {
            info!(pending = %report.id, score = threshold.current_score, "quorum reached");
            let incident_id = match self.materialize(&report, None, None).await {
                Ok(done) => Some(done.approval.incident.id),
                Err(e) => {
                    error!(pending = %report.id, error = %e, "failed to materialize incident, left for repair");
                    report.incident_id
                }
            };
            return Ok(SubmitOutcome {
                status: SubmitStatus::ThresholdMet,
                pending_id: report.id,
                threshold_progress: 1.0,
                total_reports: report.total_reports(),
                incident_id,
                message: "Report confirmed; incident published".to_string(),
            });
        }

        if threshold.is_near(&self.config) {
            let item = ModeratorQueueItem::new(report.id, Priority::Medium, NEAR_THRESHOLD_REASON, now);
            match self.store.enqueue_moderation(item).await {
                Ok(true) => info!(pending = %report.id, score = threshold.current_score, "queued for moderation"),
                Ok(false) => {}
                Err(e) => warn!(pending = %report.id, error = %e, "failed to queue for moderation"),
            }
        }

        let (status, message) = if created {
            (SubmitStatus::Created, "New report received; awaiting confirmation")
        } else {
            (SubmitStatus::Joined, "Report added to an existing pending incident")
        };
        Ok(SubmitOutcome {
            status,
            pending_id: report.id,
            threshold_progress: threshold.current_score.min(1.0),
            total_reports: report.total_reports(),
            incident_id: None,
            message: message.to_string(),
        })
    }

    /// One read-modify-write attempt. Nothing outside the pending item is
    /// touched, so a failed attempt can simply be re-run.
    async fn try_submit(&self, submission: &ReportSubmission) -> Result<Committed, QuorumError> {
        let now = self.clock.now();
        let (reputation, trust) = self
            .trust
            .standing(&submission.reporter_id, submission.reporter_reputation)
            .await?;

        let open = self.store.pending_by_status(PendingStatus::Pending).await?;
        let distance = |p: &PendingIncidentReport| p.location.distance_m(&submission.location);
        let matched = open
            .into_iter()
            .filter(|p| {
                p.matches(
                    submission.kind,
                    &submission.location,
                    now,
                    self.config.match_radius_m,
                    self.config.match_window(),
                )
            })
            .min_by(|a, b| distance(a).total_cmp(&distance(b)));

        let created = matched.is_none();
        let mut report = matched.unwrap_or_else(|| {
            PendingIncidentReport::open(
                submission.kind,
                submission.location,
                submission.line_ids.clone(),
                now,
                self.config.lifetime(),
            )
        });

        report.add_reporter(
            submission.reporter_id.clone(),
            reputation,
            trust,
            &submission.line_ids,
            now,
        )?;

        let threshold = calculate_threshold(
            report.total_reports(),
            report.total_reputation,
            &report.reporter_reputations,
            &self.config,
        );
        report.current_score = threshold.current_score;

        if threshold.is_official {
            report.transition(PendingStatus::ThresholdMet)?;
            report.threshold_met_at = Some(now);
            report.incident_id = Some(IncidentId::new());
        }

        let report = if created {
            self.store.insert_pending(report).await?
        } else {
            self.store.update_pending(report).await?
        };

        Ok(Committed {
            report,
            created,
            threshold,
        })
    }

    /// Moderator promotes a pending report to an incident.
    pub async fn approve_report(
        &self,
        pending_id: PendingId,
        moderator_id: UserId,
        notes: Option<String>,
    ) -> Result<Approval, QuorumError> {
        let report = retry(
            "approve report",
            self.config.max_attempts,
            QuorumError::is_retryable,
            move || self.try_decide(pending_id, PendingStatus::ManuallyApproved),
        )
        .await?;

        let approval = self.materialize(&report, Some(&moderator_id), notes).await?.approval;
        info!(
            pending = %pending_id,
            moderator = %moderator_id,
            incident = %approval.incident.id,
            "report approved"
        );
        Ok(approval)
    }

    /// Moderator rejects a pending report, penalizing its reporters.
    pub async fn reject_report(
        &self,
        pending_id: PendingId,
        moderator_id: UserId,
        reason: String,
        mark_fake: bool,
    ) -> Result<(), QuorumError> {
        let report = retry(
            "reject report",
            self.config.max_attempts,
            QuorumError::is_retryable,
            move || self.try_decide(pending_id, PendingStatus::Rejected),
        )
        .await?;

        let now = self.clock.now();
        let penalized = self.resolve_reporters(&report, false, mark_fake, now).await;
        self.archive(pending_id, Some(&moderator_id), Some(reason), now).await;

        info!(
            pending = %pending_id,
            moderator = %moderator_id,
            penalized = penalized.len(),
            fake = mark_fake,
            "report rejected"
        );
        Ok(())
    }

    /// Move a pending report to a moderator's decision.
    async fn try_decide(&self, id: PendingId, to: PendingStatus) -> Result<PendingIncidentReport, QuorumError> {
        let now = self.clock.now();
        let mut report = self.store.get_pending(id).await?;

        if report.status == PendingStatus::Pending && report.is_expired(now) {
            report.transition(PendingStatus::Expired)?;
            self.store.update_pending(report).await?;
            self.archive(id, None, Some("expired".to_string()), now).await;
            return Err(QuorumError::Expired(id));
        }

        report.transition(to)?;
        if to == PendingStatus::ManuallyApproved {
            report.incident_id = Some(IncidentId::new());
        }
        Ok(self.store.update_pending(report).await?)
    }

    /// Publish the incident for a promoted report, reward its reporters and
    /// notify. Safe to re-run and to race: the incident id is fixed by the
    /// report, only the run that stores the incident announces it, and each
    /// reporter's verdict is claimed once.
    async fn materialize(
        &self,
        report: &PendingIncidentReport,
        reviewer: Option<&UserId>,
        notes: Option<String>,
    ) -> Result<Materialized, QuorumError> {
        let incident_id = report.incident_id.ok_or(QuorumError::MissingIncident(report.id))?;
        let now = self.clock.now();

        let mut incident = Incident::published(
            report.kind,
            report.line_ids.clone(),
            IncidentSource::Crowd {
                pending_id: report.id,
            },
            now,
        );
        incident.id = incident_id;
        incident.reporter = report.reporter_ids.first().cloned();
        incident.stop_ids = self.stops_near(&report.location).await;

        let published = match self.store.insert_incident(incident.clone()).await {
            Ok(()) => true,
            Err(StoreError::AlreadyExists { .. }) => {
                debug!(pending = %report.id, incident = %incident_id, "incident already published");
                incident = self.store.get_incident(incident_id).await?;
                false
            }
            Err(e) => return Err(e.into()),
        };

        let rewarded_users = self.resolve_reporters(report, true, false, now).await;

        if published {
            let provenance = if report.status == PendingStatus::ManuallyApproved {
                Provenance::Staff
            } else {
                Provenance::Crowd(report)
            };
            if let Err(e) = self.dispatcher.dispatch_created(&incident, provenance).await {
                warn!(incident = %incident.id, error = %e, "notification dispatch failed");
            }
        }

        self.archive(report.id, reviewer, notes, now).await;

        info!(
            pending = %report.id,
            incident = %incident.id,
            rewarded = rewarded_users.len(),
            published,
            "incident materialized"
        );
        Ok(Materialized {
            approval: Approval {
                incident,
                rewarded_users,
            },
            published,
        })
    }

    /// The stop within the match radius of `location`, if one is known.
    async fn stops_near(&self, location: &GeoPoint) -> Vec<StopId> {
        let Some(journeys) = &self.stops else {
            return Vec::new();
        };
        match journeys.nearest_stop(location).await {
            Some((stop, distance)) if distance <= self.config.match_radius_m => vec![stop.id],
            _ => Vec::new(),
        }
    }

    /// Judge every reporter of `report` that hasn't been judged yet.
    ///
    /// Each verdict is claimed in the store before the reputation change,
    /// so concurrent or repeated runs judge a reporter at most once.
    /// Returns the users whose reputation changed.
    async fn resolve_reporters(
        &self,
        report: &PendingIncidentReport,
        correct: bool,
        fake: bool,
        now: DateTime<Utc>,
    ) -> Vec<UserId> {
        let records = match self.store.records_for_pending(report.id).await {
            Ok(records) => records,
            Err(e) => {
                warn!(pending = %report.id, error = %e, "failed to load report records");
                Vec::new()
            }
        };
        let outcome = if correct {
            ReportOutcome::Validated
        } else {
            ReportOutcome::Rejected
        };

        let mut resolved = Vec::new();
        for (i, user) in report.reporter_ids.iter().enumerate() {
            let submitted_at = records
                .iter()
                .find(|r| &r.user_id == user)
                .map_or(report.created_at, |r| r.submitted_at);
            let verdict = ReportRecord {
                outcome,
                fake,
                resolved_at: Some(now),
                ..ReportRecord::new(user.clone(), report.id, submitted_at)
            };

            match self.store.resolve_record(verdict).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(pending = %report.id, user = %user, "reporter already judged");
                    continue;
                }
                Err(e) => {
                    warn!(pending = %report.id, user = %user, error = %e, "failed to resolve report record");
                    continue;
                }
            }

            let fallback = report.reporter_reputations.get(i).copied().unwrap_or_default();
            match self
                .trust
                .apply_resolution(user, correct, now - submitted_at, fallback)
                .await
            {
                Ok(_) => resolved.push(user.clone()),
                Err(e) => warn!(user = %user, error = %e, "failed to update reputation"),
            }
        }
        resolved
    }

    async fn archive(
        &self,
        pending: PendingId,
        reviewer: Option<&UserId>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) {
        if let Err(e) = self
            .store
            .archive_moderation(pending, reviewer.cloned(), notes, now)
            .await
        {
            warn!(pending = %pending, error = %e, "failed to archive moderation item");
        }
    }

    /// Mark pending reports past their lifetime as expired.
    ///
    /// Items that change underneath the sweep are left for the next run.
    pub async fn expire_stale(&self) -> Result<usize, QuorumError> {
        let now = self.clock.now();
        let open = self.store.pending_by_status(PendingStatus::Pending).await?;
        let mut expired = 0;

        for mut report in open.into_iter().filter(|p| p.is_expired(now)) {
            let id = report.id;
            report.transition(PendingStatus::Expired)?;
            match self.store.update_pending(report).await {
                Ok(_) => {
                    expired += 1;
                    self.archive(id, None, Some("expired".to_string()), now).await;
                }
                Err(e) => debug!(pending = %id, error = %e, "skipping expiry, will retry next sweep"),
            }
        }

        if expired > 0 {
            info!(expired, "expired stale pending reports");
        }
        Ok(expired)
    }

    /// Re-materialize promoted reports whose incident never got stored.
    pub async fn repair_promoted(&self) -> Result<usize, QuorumError> {
        let mut repaired = 0;

        for status in [PendingStatus::ThresholdMet, PendingStatus::ManuallyApproved] {
            for report in self.store.pending_by_status(status).await? {
                let Some(incident_id) = report.incident_id else {
                    continue;
                };
                match self.store.get_incident(incident_id).await {
                    Ok(_) => {}
                    Err(StoreError::NotFound { .. }) => {
                        match self.materialize(&report, None, None).await {
                            Ok(done) if done.published => {
                                warn!(pending = %report.id, incident = %incident_id, "repaired missing incident");
                                repaired += 1;
                            }
                            Ok(_) => debug!(pending = %report.id, "incident published concurrently"),
                            Err(e) => warn!(pending = %report.id, error = %e, "repair failed"),
                        }
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(repaired)
    }

    /// Open moderator queue items, highest priority first.
    pub async fn moderation_queue(&self) -> Result<Vec<ModeratorQueueItem>, QuorumError> {
        Ok(self.store.open_moderation_items().await?)
    }

    pub async fn pending_report(&self, id: PendingId) -> Result<PendingIncidentReport, QuorumError> {
        Ok(self.store.get_pending(id).await?)
    }
}
