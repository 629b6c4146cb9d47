//! Trust score and reputation arithmetic.
//!
//! Reputation is the canonical per-user number; it only changes when one of
//! the user's reports is resolved. The trust score is derived from
//! reputation plus recent report history and is never updated on its own.

use chrono::{DateTime, Duration, Utc};

use crate::domain::{ReportOutcome, ReportRecord, TrustBreakdown};

/// Tunables for trust scoring and reputation changes.
#[derive(Debug, Clone)]
pub struct TrustConfig {
    /// Days of report history considered for accuracy and fake penalties.
    pub history_days: i64,

    pub min_score: f64,
    pub max_score: f64,
    pub min_base: f64,
    pub max_base: f64,

    /// Weight of the validation rate in the accuracy bonus.
    pub accuracy_weight: f64,

    /// Reputation from which the high-reputation bonus applies.
    pub high_reputation: u32,

    /// Penalty per fake report within the history window.
    pub fake_penalty: f64,

    pub correct_reward: f64,
    pub incorrect_penalty: f64,

    /// Correct reports resolved faster than this earn an early bonus.
    pub early_window_mins: i64,

    /// Incorrect reports from users above this reputation cost more.
    pub stakes_reputation: u32,
    pub stakes_multiplier: f64,

    /// Concurrent-update attempts for a user's reputation.
    pub max_attempts: u32,
}

impl TrustConfig {
    pub fn history_window(&self) -> Duration {
        Duration::days(self.history_days)
    }
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            history_days: 30,
            min_score: 0.5,
            max_score: 2.5,
            min_base: 0.5,
            max_base: 2.0,
            accuracy_weight: 0.3,
            high_reputation: 100,
            fake_penalty: 0.1,
            correct_reward: 10.0,
            incorrect_penalty: -5.0,
            early_window_mins: 10,
            stakes_reputation: 50,
            stakes_multiplier: 1.5,
            max_attempts: 3,
        }
    }
}

/// Report counts within the history window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportHistory {
    pub validated: u32,
    pub rejected: u32,
    pub fake: u32,
}

impl ReportHistory {
    /// Tally resolved outcomes and fake flags from `records`.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ReportRecord>) -> Self {
        records
            .into_iter()
            .fold(ReportHistory::default(), |mut h, record| {
                match record.outcome {
                    ReportOutcome::Validated => h.validated += 1,
                    ReportOutcome::Rejected => h.rejected += 1,
                    ReportOutcome::Pending => {}
                }
                if record.fake {
                    h.fake += 1;
                }
                h
            })
    }

    /// Validated share of resolved reports; 0 when none are resolved.
    pub fn validation_rate(&self) -> f64 {
        let resolved = self.validated + self.rejected;
        if resolved == 0 {
            0.0
        } else {
            f64::from(self.validated) / f64::from(resolved)
        }
    }
}

/// Compute a user's trust breakdown.
pub fn compute_trust(
    reputation: u32,
    history: &ReportHistory,
    config: &TrustConfig,
    now: DateTime<Utc>,
) -> TrustBreakdown {
    let reputation_f = f64::from(reputation);
    let base = (reputation_f / 100.0).clamp(config.min_base, config.max_base);

    let validation_rate = history.validation_rate();
    let accuracy_bonus = validation_rate * config.accuracy_weight;

    let high_rep_bonus = if reputation >= config.high_reputation {
        let scale = ((reputation_f - f64::from(config.high_reputation)) / 100.0).min(1.0);
        base * 0.25 * scale
    } else {
        0.0
    };

    let fake_penalty = config.fake_penalty * f64::from(history.fake);

    let score = (base + accuracy_bonus + high_rep_bonus - fake_penalty)
        .clamp(config.min_score, config.max_score);

    TrustBreakdown {
        base,
        accuracy_bonus,
        high_rep_bonus,
        fake_penalty,
        validation_rate,
        score,
        updated_at: now,
    }
}

/// Signed reputation change for one resolved report.
///
/// `resolved_after` is how long the report waited for its resolution.
pub fn reputation_delta(
    reputation: u32,
    correct: bool,
    resolved_after: Duration,
    config: &TrustConfig,
) -> i64 {
    let reputation_f = f64::from(reputation);
    let base = if correct {
        config.correct_reward
    } else {
        config.incorrect_penalty
    };

    let diminishing = (1.0 - reputation_f / 1000.0).max(0.5);
    let mut delta = base * diminishing;

    if correct {
        let window = config.early_window_mins as f64;
        let minutes = resolved_after.num_seconds().max(0) as f64 / 60.0;
        if window > 0.0 && minutes < window {
            delta *= 1.0 + (window - minutes) / window;
        }
    } else if reputation > config.stakes_reputation {
        delta *= config.stakes_multiplier;
    }

    delta.round() as i64
}

/// Apply a delta, flooring reputation at zero.
pub fn apply_delta(reputation: u32, delta: i64) -> u32 {
    let next = i64::from(reputation).saturating_add(delta);
    next.clamp(0, i64::from(u32::MAX)) as u32
}
