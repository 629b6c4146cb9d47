//! Crowd reports awaiting promotion, and the moderator queue.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{DomainError, IncidentId, IncidentKind, LineId, PendingId, UserId};
use crate::geo::GeoPoint;

/// Status of a pending incident report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PendingStatus {
    Pending,
    ThresholdMet,
    ManuallyApproved,
    Rejected,
    Expired,
}

impl PendingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingStatus::Pending => "PENDING",
            PendingStatus::ThresholdMet => "THRESHOLD_MET",
            PendingStatus::ManuallyApproved => "MANUALLY_APPROVED",
            PendingStatus::Rejected => "REJECTED",
            PendingStatus::Expired => "EXPIRED",
        }
    }

    /// Whether the report was promoted into an incident.
    pub fn is_promoted(&self) -> bool {
        matches!(
            self,
            PendingStatus::ThresholdMet | PendingStatus::ManuallyApproved
        )
    }
}

/// Aggregate of individual reports describing the same real-world event.
///
/// # Invariants
///
/// - A user id appears at most once in `reporter_ids`
/// - `reporter_ids`, `reporter_reputations` and `reporter_trust` are parallel
/// - `total_reputation` is the sum of `reporter_reputations`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingIncidentReport {
    pub id: PendingId,
    pub kind: IncidentKind,
    pub location: GeoPoint,
    pub line_ids: Vec<LineId>,
    pub reporter_ids: Vec<UserId>,
    /// Reputation of each reporter at the time they reported.
    pub reporter_reputations: Vec<u32>,
    /// Trust score of each reporter at the time they reported.
    pub reporter_trust: Vec<f64>,
    pub total_reputation: u64,
    pub current_score: f64,
    pub status: PendingStatus,
    pub created_at: DateTime<Utc>,
    pub last_report_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub threshold_met_at: Option<DateTime<Utc>>,
    pub incident_id: Option<IncidentId>,
    /// Optimistic-concurrency version, bumped by the store on every write.
    pub version: u64,
}

impl PendingIncidentReport {
    /// Open a new pending report from its first reporter.
    pub fn open(
        kind: IncidentKind,
        location: GeoPoint,
        line_ids: Vec<LineId>,
        now: DateTime<Utc>,
        lifetime: Duration,
    ) -> Self {
        Self {
            id: PendingId::new(),
            kind,
            location,
            line_ids,
            reporter_ids: Vec::new(),
            reporter_reputations: Vec::new(),
            reporter_trust: Vec::new(),
            total_reputation: 0,
            current_score: 0.0,
            status: PendingStatus::Pending,
            created_at: now,
            last_report_at: now,
            expires_at: now + lifetime,
            threshold_met_at: None,
            incident_id: None,
            version: 0,
        }
    }

    pub fn total_reports(&self) -> usize {
        self.reporter_ids.len()
    }

    pub fn has_reporter(&self, user: &UserId) -> bool {
        self.reporter_ids.contains(user)
    }

    /// Append a reporter, merging any new candidate lines.
    pub fn add_reporter(
        &mut self,
        user: UserId,
        reputation: u32,
        trust: f64,
        lines: &[LineId],
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.has_reporter(&user) {
            return Err(DomainError::DuplicateReporter(user));
        }
        self.reporter_ids.push(user);
        self.reporter_reputations.push(reputation);
        self.reporter_trust.push(trust);
        self.total_reputation += u64::from(reputation);
        for line in lines {
            if !self.line_ids.contains(line) {
                self.line_ids.push(line.clone());
            }
        }
        self.last_report_at = self.last_report_at.max(now);
        Ok(())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether a new report of `kind` at `location` describes this event.
    pub fn matches(
        &self,
        kind: IncidentKind,
        location: &GeoPoint,
        now: DateTime<Utc>,
        radius_m: f64,
        window: Duration,
    ) -> bool {
        self.status == PendingStatus::Pending
            && !self.is_expired(now)
            && self.kind == kind
            && now - self.last_report_at <= window
            && self.location.distance_m(location) <= radius_m
    }

    /// Move to a new status, refusing to leave a terminal one.
    pub fn transition(&mut self, to: PendingStatus) -> Result<(), DomainError> {
        if self.status != PendingStatus::Pending {
            return Err(DomainError::InvalidTransition {
                from: self.status.as_str(),
                to: to.as_str(),
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn shares_line_with(&self, lines: &[LineId]) -> bool {
        self.line_ids.iter().any(|l| lines.contains(l))
    }
}

/// Review priority of a moderator queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// A pending report that needs a human decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeratorQueueItem {
    pub pending_id: PendingId,
    pub priority: Priority,
    pub reason: String,
    pub assignee: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<UserId>,
    pub notes: Option<String>,
}

impl ModeratorQueueItem {
    pub fn new(
        pending_id: PendingId,
        priority: Priority,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            pending_id,
            priority,
            reason: reason.into(),
            assignee: None,
            created_at: now,
            reviewed_at: None,
            reviewed_by: None,
            notes: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.reviewed_at.is_none()
    }
}

/// How one user's report was judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportOutcome {
    Pending,
    Validated,
    Rejected,
}

/// One user's contribution to a pending report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub user_id: UserId,
    pub pending_id: PendingId,
    pub submitted_at: DateTime<Utc>,
    pub outcome: ReportOutcome,
    pub fake: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ReportRecord {
    pub fn new(user_id: UserId, pending_id: PendingId, submitted_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            pending_id,
            submitted_at,
            outcome: ReportOutcome::Pending,
            fake: false,
            resolved_at: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome != ReportOutcome::Pending
    }
}
