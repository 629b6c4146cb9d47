//! Quorum threshold calculation.

use chrono::Duration;
use serde::Serialize;

/// Tunables for the quorum decision and report matching.
#[derive(Debug, Clone)]
pub struct ThresholdConfig {
    /// Reporters below this reputation don't count toward quorum.
    pub min_reputation: u32,

    /// Number of valid reporters for a full report score.
    pub base_report_count: usize,

    /// Total valid reputation for a full reputation score.
    pub base_reputation_required: u64,

    /// Reporters above this reputation earn the high-reputation bonus.
    pub high_reputation: u32,

    pub report_weight: f64,
    pub reputation_weight: f64,

    /// Upper bound on the boosted reputation score.
    pub max_reputation_bonus: f64,

    /// Scores at or above this (and below 1.0) are queued for review.
    pub near_threshold: f64,

    /// Reports closer than this join an existing pending item (metres).
    pub match_radius_m: f64,

    /// Reports within this many minutes of the last one join an existing item.
    pub match_window_mins: i64,

    /// Pending items expire this many hours after creation.
    pub lifetime_hours: i64,

    /// Read-modify-write attempts before a conflict surfaces as transient.
    pub max_attempts: u32,
}

impl ThresholdConfig {
    pub fn match_window(&self) -> Duration {
        Duration::minutes(self.match_window_mins)
    }

    pub fn lifetime(&self) -> Duration {
        Duration::hours(self.lifetime_hours)
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_reputation: 10,
            base_report_count: 3,
            base_reputation_required: 100,
            high_reputation: 100,
            report_weight: 0.4,
            reputation_weight: 0.6,
            max_reputation_bonus: 1.5,
            near_threshold: 0.7,
            match_radius_m: 500.0,
            match_window_mins: 30,
            lifetime_hours: 24,
            max_attempts: 3,
        }
    }
}

/// Outcome of a threshold calculation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub valid_reports: usize,
    pub valid_reputation: u64,
    pub report_score: f64,
    pub reputation_score: f64,
    pub current_score: f64,
    pub is_official: bool,
}

impl ThresholdResult {
    /// Whether the score warrants a human look without being official.
    pub fn is_near(&self, config: &ThresholdConfig) -> bool {
        !self.is_official && self.current_score >= config.near_threshold
    }
}

/// Decide whether a set of reports is enough to publish an incident.
///
/// `reputations` lists each reporter's reputation at report time. Reporters
/// below `min_reputation` are removed from both `total_reports` and
/// `total_reputation` before scoring.
pub fn calculate_threshold(
    total_reports: usize,
    total_reputation: u64,
    reputations: &[u32],
    config: &ThresholdConfig,
) -> ThresholdResult {
    let excluded: Vec<u32> = reputations
        .iter()
        .copied()
        .filter(|&r| r < config.min_reputation)
        .collect();
    let excluded_reputation: u64 = excluded.iter().map(|&r| u64::from(r)).sum();

    let valid_reports = total_reports.saturating_sub(excluded.len());
    let valid_reputation = total_reputation.saturating_sub(excluded_reputation);

    let report_score = if config.base_report_count == 0 {
        1.0
    } else {
        (valid_reports as f64 / config.base_report_count as f64).min(1.0)
    };

    let mut reputation_score = if config.base_reputation_required == 0 {
        1.0
    } else {
        (valid_reputation as f64 / config.base_reputation_required as f64).min(1.0)
    };

    let valid_count = reputations.len() - excluded.len();
    let high = reputations
        .iter()
        .filter(|&&r| r >= config.min_reputation && r > config.high_reputation)
        .count();
    if high > 0 && valid_count > 0 {
        let fraction = high as f64 / valid_count as f64;
        reputation_score = (reputation_score * (1.0 + 0.5 * fraction)).min(config.max_reputation_bonus);
    }

    let current_score =
        report_score * config.report_weight + reputation_score * config.reputation_weight;

    ThresholdResult {
        valid_reports,
        valid_reputation,
        report_score,
        reputation_score,
        current_score,
        is_official: current_score >= 1.0,
    }
}
