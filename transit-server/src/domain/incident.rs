//! Incidents: published disruptions that affect journey planning.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DomainError, IncidentId, LineId, PendingId, StopId, UserId};

/// What kind of disruption an incident describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IncidentKind {
    Generic,
    NetworkFailure,
    VehicleFailure,
    Accident,
    TrafficJam,
    PlatformChange,
}

impl IncidentKind {
    pub const ALL: [IncidentKind; 6] = [
        IncidentKind::Generic,
        IncidentKind::NetworkFailure,
        IncidentKind::VehicleFailure,
        IncidentKind::Accident,
        IncidentKind::TrafficJam,
        IncidentKind::PlatformChange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentKind::Generic => "generic",
            IncidentKind::NetworkFailure => "network-failure",
            IncidentKind::VehicleFailure => "vehicle-failure",
            IncidentKind::Accident => "accident",
            IncidentKind::TrafficJam => "traffic-jam",
            IncidentKind::PlatformChange => "platform-change",
        }
    }
}

impl fmt::Display for IncidentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentKind {
    type Err = DomainError;

    /// Accepts kebab-case, snake_case and SCREAMING_SNAKE_CASE spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        IncidentKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| DomainError::UnknownIncidentKind(s.to_string()))
    }
}

/// Lifecycle of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Draft,
    Published,
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Draft => "draft",
            IncidentStatus::Published => "published",
            IncidentStatus::Resolved => "resolved",
        }
    }
}

/// Severity tier derived from a delay magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Tier for a delay in minutes: ≥30 critical, ≥15 high, ≥5 medium.
    pub fn from_delay(minutes: u32) -> Self {
        match minutes {
            30.. => Severity::Critical,
            15..=29 => Severity::High,
            5..=14 => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

/// Who caused an incident to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IncidentSource {
    /// Created directly by an administrator or moderator.
    Staff { created_by: UserId },
    /// Promoted from a pending crowd report.
    Crowd { pending_id: PendingId },
}

/// A disruption on one or more lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub kind: IncidentKind,
    pub status: IncidentStatus,
    pub title: String,
    pub line_ids: Vec<LineId>,
    /// Stops close to the disruption; edges touching them get amplified delay.
    pub stop_ids: Vec<StopId>,
    /// Restricts the incident to these stop pairs when non-empty.
    pub segments: Vec<(StopId, StopId)>,
    /// Overrides the kind's default delay when set.
    pub delay_minutes: Option<u32>,
    pub fake: bool,
    pub reporter: Option<UserId>,
    pub source: IncidentSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Incident {
    /// Create a published incident.
    pub fn published(
        kind: IncidentKind,
        line_ids: Vec<LineId>,
        source: IncidentSource,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: IncidentId::new(),
            kind,
            status: IncidentStatus::Published,
            title: kind.as_str().replace('-', " "),
            line_ids,
            stop_ids: Vec::new(),
            segments: Vec::new(),
            delay_minutes: None,
            fake: false,
            reporter: None,
            source,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the incident currently influences planning.
    pub fn is_active(&self) -> bool {
        self.status == IncidentStatus::Published
    }

    pub fn is_crowd_sourced(&self) -> bool {
        matches!(self.source, IncidentSource::Crowd { .. })
    }

    pub fn affects_line(&self, line: &LineId) -> bool {
        self.line_ids.contains(line)
    }

    /// Draft → published.
    pub fn publish(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != IncidentStatus::Draft {
            return Err(DomainError::InvalidTransition {
                from: self.status.as_str(),
                to: IncidentStatus::Published.as_str(),
            });
        }
        self.status = IncidentStatus::Published;
        self.updated_at = now;
        Ok(())
    }

    /// Draft or published → resolved.
    pub fn resolve(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status == IncidentStatus::Resolved {
            return Err(DomainError::InvalidTransition {
                from: self.status.as_str(),
                to: IncidentStatus::Resolved.as_str(),
            });
        }
        self.status = IncidentStatus::Resolved;
        self.updated_at = now;
        Ok(())
    }
}
