//! Degraded-mode opinion selection
//!
//! When the chair cannot synthesize, the report falls back to a single R1
//! opinion. Selection is a total order, so the same R1 result always
//! yields the same fallback:
//!
//! 1. more of recommendation / rationale / risks present
//! 2. lower latency of the call that produced it
//! 3. provider name, ascending

use super::entities::CouncilOpinion;
use super::results::RoundResult;
use std::cmp::Ordering;

/// Rank key of an opinion within its round. Smaller is better.
fn rank(round: &RoundResult<CouncilOpinion>, opinion: &CouncilOpinion) -> (u8, u64) {
    let latency = round
        .call_for(&opinion.provider)
        .map(|c| c.latency_ms)
        .unwrap_or(u64::MAX);
    (3 - opinion.completeness().min(3), latency)
}

fn compare(
    round: &RoundResult<CouncilOpinion>,
    a: &CouncilOpinion,
    b: &CouncilOpinion,
) -> Ordering {
    rank(round, a)
        .cmp(&rank(round, b))
        .then_with(|| a.provider.cmp(&b.provider))
}

/// Best opinion of a settled R1, or `None` if nothing succeeded.
pub fn select_best_opinion(round: &RoundResult<CouncilOpinion>) -> Option<&CouncilOpinion> {
    round.outputs.iter().min_by(|a, b| compare(round, a, b))
}
