//! Council rounds

use serde::{Deserialize, Serialize};

/// Round of a council run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Round {
    /// R1 - every participant answers independently
    #[serde(rename = "r1")]
    Independent,
    /// R2 - participants critique each other's R1 opinions
    #[serde(rename = "r2")]
    CrossReview,
    /// R3 - the chair synthesizes opinions and reviews
    #[serde(rename = "r3")]
    Synthesis,
}

impl Round {
    pub fn as_str(&self) -> &'static str {
        match self {
            Round::Independent => "r1",
            Round::CrossReview => "r2",
            Round::Synthesis => "r3",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Round::Independent => "Independent Opinions",
            Round::CrossReview => "Cross Review",
            Round::Synthesis => "Chair Synthesis",
        }
    }

    /// 1-based round number
    pub fn number(&self) -> u8 {
        match self {
            Round::Independent => 1,
            Round::CrossReview => 2,
            Round::Synthesis => 3,
        }
    }

    /// Whether the round fans out to every eligible participant
    pub fn is_fan_out(&self) -> bool {
        !matches!(self, Round::Synthesis)
    }
}

impl std::fmt::Display for Round {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
