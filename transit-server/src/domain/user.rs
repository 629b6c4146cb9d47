//! Trust-relevant user fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LineId, UserId};

/// Components of a user's trust score, kept for auditability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustBreakdown {
    pub base: f64,
    pub accuracy_bonus: f64,
    pub high_rep_bonus: f64,
    pub fake_penalty: f64,
    pub validation_rate: f64,
    /// Final clamped multiplier.
    pub score: f64,
    pub updated_at: DateTime<Utc>,
}

/// A user as seen by the reporting and notification subsystems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub reputation: u32,
    /// Absent until first computed.
    pub trust: Option<TrustBreakdown>,
    /// Lines on the user's journey in progress.
    pub active_journey_lines: Vec<LineId>,
    /// Lines on the user's saved favourite routes.
    pub favorite_lines: Vec<LineId>,
    /// Optimistic-concurrency version, bumped by the store on every write.
    pub version: u64,
}

impl User {
    pub fn new(id: UserId, reputation: u32) -> Self {
        Self {
            id,
            reputation,
            trust: None,
            active_journey_lines: Vec::new(),
            favorite_lines: Vec::new(),
            version: 0,
        }
    }

    /// Whether the user travels on or follows any of `lines`.
    pub fn follows_any(&self, lines: &[LineId]) -> bool {
        self.active_journey_lines
            .iter()
            .chain(&self.favorite_lines)
            .any(|l| lines.contains(l))
    }

    pub fn trust_score(&self) -> Option<f64> {
        self.trust.as_ref().map(|t| t.score)
    }
}
