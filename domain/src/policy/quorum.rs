//! Quorum thresholds per round

use crate::core::round::Round;
use serde::{Deserialize, Serialize};

/// Minimum successful responses required for each round
///
/// # Example
///
/// ```
/// use council_domain::core::round::Round;
/// use council_domain::policy::QuorumPolicy;
///
/// let policy = QuorumPolicy::default();
/// assert!(policy.check(Round::Independent, 2).met);
/// assert!(!policy.check(Round::Independent, 1).met);
/// assert!(policy.check(Round::CrossReview, 1).met);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuorumPolicy {
    /// Successful R1 opinions required
    pub r1_min: usize,
    /// Successful R2 reviews required
    pub r2_min: usize,
    /// Whether R3 must produce a report (directly or via fallback)
    pub r3_required: bool,
}

impl Default for QuorumPolicy {
    fn default() -> Self {
        Self {
            r1_min: 2,
            r2_min: 1,
            r3_required: true,
        }
    }
}

/// Result of applying the quorum policy to a settled round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumCheck {
    pub round: Round,
    pub succeeded: usize,
    pub required: usize,
    pub met: bool,
}

impl QuorumPolicy {
    pub fn new(r1_min: usize, r2_min: usize) -> Self {
        Self {
            r1_min,
            r2_min,
            ..Default::default()
        }
    }

    pub fn minimum_for(&self, round: Round) -> usize {
        match round {
            Round::Independent => self.r1_min,
            Round::CrossReview => self.r2_min,
            Round::Synthesis => usize::from(self.r3_required),
        }
    }

    pub fn check(&self, round: Round, succeeded: usize) -> QuorumCheck {
        let required = self.minimum_for(round);
        QuorumCheck {
            round,
            succeeded,
            required,
            met: succeeded >= required,
        }
    }

    /// Human-readable description of the thresholds
    pub fn description(&self) -> String {
        format!(
            "r1 >= {}, r2 >= {}, r3 {}",
            self.r1_min,
            self.r2_min,
            if self.r3_required {
                "required"
            } else {
                "optional"
            }
        )
    }
}

impl std::fmt::Display for QuorumPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}
