//! Normalized per-round outputs
//!
//! - [`CouncilOpinion`] - one provider's R1 answer
//! - [`CouncilReview`] - one provider's R2 critiques of other opinions
//! - [`ChairSynthesis`] - the chair's R3 synthesis
//!
//! An entry of any of these types only exists for a transport call that
//! returned `ok` and whose content passed (possibly partial) schema
//! extraction.

use crate::core::confidence::Confidence;
use crate::core::round::Round;
use serde::{Deserialize, Serialize};

/// Independent opinion from a single provider (R1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouncilOpinion {
    pub provider: String,
    pub model: String,
    pub round: Round,
    /// Milliseconds since epoch when the opinion was normalized
    pub timestamp: u64,
    pub recommendation: String,
    pub rationale: String,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    pub confidence: Confidence,
    /// Recovered by best-effort extraction rather than schema parsing
    #[serde(default)]
    pub partial: bool,
}

impl CouncilOpinion {
    /// Number of the three core fields (recommendation, rationale, risks)
    /// that carry content.
    pub fn completeness(&self) -> u8 {
        [
            !self.recommendation.trim().is_empty(),
            !self.rationale.trim().is_empty(),
            !self.risks.is_empty(),
        ]
        .iter()
        .filter(|present| **present)
        .count() as u8
    }
}

/// One critique inside a review, keyed to the reviewed provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Critique {
    /// Provider whose R1 opinion is being critiqued
    pub target: String,
    pub assessment: String,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agrees: Option<bool>,
}

/// Cross review from a single provider (R2)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouncilReview {
    pub provider: String,
    pub model: String,
    pub round: Round,
    pub timestamp: u64,
    pub critiques: Vec<Critique>,
    pub summary: String,
    /// Critiques the reviewer produced, including ones that could not be
    /// structured or keyed to a known target
    pub critique_count: usize,
    #[serde(default)]
    pub partial: bool,
}

impl CouncilReview {
    /// Whether any critique raised a concern or disagreed.
    pub fn has_objections(&self) -> bool {
        self.critiques
            .iter()
            .any(|c| !c.concerns.is_empty() || c.agrees == Some(false))
    }
}

/// Chair synthesis (R3)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChairSynthesis {
    pub provider: String,
    pub model: String,
    pub round: Round,
    pub timestamp: u64,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    pub confidence: Confidence,
}
