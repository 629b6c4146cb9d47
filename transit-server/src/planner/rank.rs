//! Journey ranking for search results.

use crate::domain::Journey;

/// Rank journeys by preference.
///
/// Journeys are ranked by:
/// 1. Total duration, incident delay included (shorter is better)
/// 2. Number of transfers (fewer is better)
///
/// The sort is stable, so equal journeys keep their discovery order.
/// Returns journeys sorted best-first.
pub fn rank_journeys(mut journeys: Vec<Journey>) -> Vec<Journey> {
    journeys.sort_by(|a, b| {
        a.total_duration_minutes()
            .cmp(&b.total_duration_minutes())
            .then_with(|| a.transfer_count().cmp(&b.transfer_count()))
    });
    journeys
}
