//! Short-circuit policy
//!
//! A short-circuit policy inspects a settled round and may decide that the
//! remaining rounds add nothing. It is consulted twice per run:
//!
//! - after R1 settles: triggering skips R2 and R3
//! - after R2 settles: triggering skips the chair call of R3
//!
//! In both cases the report reuses the R1 consensus opinion and its
//! confidence is capped, so skipped rounds never inflate confidence.

use crate::core::confidence::Confidence;
use crate::core::round::Round;
use crate::council::entities::{CouncilOpinion, CouncilReview};
use crate::council::results::RoundResult;
use serde::{Deserialize, Serialize};

/// Cap applied to the reported confidence of a short-circuited run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceAdjustment {
    pub cap: Confidence,
}

impl ConfidenceAdjustment {
    pub fn apply(&self, confidence: Confidence) -> Confidence {
        confidence.capped_at(self.cap)
    }
}

impl Default for ConfidenceAdjustment {
    fn default() -> Self {
        Self {
            cap: Confidence::Medium,
        }
    }
}

/// Answer from a policy hook that wants to short-circuit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortCircuitVerdict {
    pub reason: String,
    pub confidence_cap: Confidence,
}

impl ShortCircuitVerdict {
    /// Verdict with the default `medium` cap
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            confidence_cap: Confidence::Medium,
        }
    }

    pub fn with_cap(mut self, cap: Confidence) -> Self {
        // a policy may tighten the cap but never lift it above medium
        self.confidence_cap = cap.min(Confidence::Medium);
        self
    }
}

/// Recorded outcome of a short-circuit evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortCircuitDecision {
    pub triggered: bool,
    pub reason: String,
    pub rounds_skipped: Vec<Round>,
    pub confidence_adjustment: ConfidenceAdjustment,
}

impl ShortCircuitDecision {
    /// Decision taken at `after` from a policy verdict.
    pub fn from_verdict(after: Round, verdict: ShortCircuitVerdict) -> Self {
        let rounds_skipped = match after {
            Round::Independent => vec![Round::CrossReview, Round::Synthesis],
            Round::CrossReview | Round::Synthesis => vec![Round::Synthesis],
        };
        Self {
            triggered: true,
            reason: verdict.reason,
            rounds_skipped,
            confidence_adjustment: ConfidenceAdjustment {
                cap: verdict.confidence_cap,
            },
        }
    }

    pub fn skips(&self, round: Round) -> bool {
        self.triggered && self.rounds_skipped.contains(&round)
    }
}

/// Pluggable short-circuit predicate set.
///
/// Both hooks default to "never", so an implementation only overrides the
/// point it cares about.
pub trait ShortCircuitPolicy: Send + Sync {
    fn name(&self) -> &str;

    fn after_independent(&self, _r1: &RoundResult<CouncilOpinion>) -> Option<ShortCircuitVerdict> {
        None
    }

    fn after_review(
        &self,
        _r1: &RoundResult<CouncilOpinion>,
        _r2: &RoundResult<CouncilReview>,
    ) -> Option<ShortCircuitVerdict> {
        None
    }
}

/// Never short-circuits. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledShortCircuit;

impl ShortCircuitPolicy for DisabledShortCircuit {
    fn name(&self) -> &str {
        "disabled"
    }
}

/// Short-circuits when every R1 recommendation is the same text (after
/// whitespace and case normalization), and after R2 when no reviewer raised
/// a concern.
#[derive(Debug, Clone, Copy)]
pub struct UnanimousRecommendation {
    /// Fewest successful opinions that can count as unanimous
    pub min_opinions: usize,
}

impl Default for UnanimousRecommendation {
    fn default() -> Self {
        Self { min_opinions: 2 }
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches('.')
        .to_lowercase()
}

impl UnanimousRecommendation {
    fn unanimous(&self, r1: &RoundResult<CouncilOpinion>) -> bool {
        if r1.outputs.len() < self.min_opinions.max(2) {
            return false;
        }
        let mut recommendations = r1.outputs.iter().map(|o| normalize(&o.recommendation));
        match recommendations.next() {
            Some(first) if !first.is_empty() => recommendations.all(|r| r == first),
            _ => false,
        }
    }
}

impl ShortCircuitPolicy for UnanimousRecommendation {
    fn name(&self) -> &str {
        "unanimous"
    }

    fn after_independent(&self, r1: &RoundResult<CouncilOpinion>) -> Option<ShortCircuitVerdict> {
        self.unanimous(r1).then(|| {
            ShortCircuitVerdict::new(format!(
                "All {} independent opinions recommend the same action",
                r1.outputs.len()
            ))
        })
    }

    fn after_review(
        &self,
        r1: &RoundResult<CouncilOpinion>,
        r2: &RoundResult<CouncilReview>,
    ) -> Option<ShortCircuitVerdict> {
        // partial reviews carry no structured critiques, so they prove nothing
        let quiet = !r2.outputs.is_empty()
            && r2.outputs.iter().all(|r| !r.partial && !r.has_objections());
        (self.unanimous(r1) && quiet).then(|| {
            ShortCircuitVerdict::new("Independent opinions agree and no reviewer raised a concern")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::council::entities::Critique;

    fn opinion(provider: &str, recommendation: &str) -> CouncilOpinion {
        CouncilOpinion {
            provider: provider.to_string(),
            model: "m".to_string(),
            round: Round::Independent,
            timestamp: 0,
            recommendation: recommendation.to_string(),
            rationale: "because".to_string(),
            risks: vec![],
            assumptions: vec![],
            confidence: Confidence::High,
            partial: false,
        }
    }

    fn r1(recommendations: &[(&str, &str)]) -> RoundResult<CouncilOpinion> {
        let mut result = RoundResult::new(Round::Independent, 0);
        for (provider, recommendation) in recommendations {
            result.outputs.push(opinion(provider, recommendation));
        }
        result
    }

    fn review(provider: &str, concerns: &[&str]) -> CouncilReview {
        CouncilReview {
            provider: provider.to_string(),
            model: "m".to_string(),
            round: Round::CrossReview,
            timestamp: 0,
            critiques: vec![Critique {
                target: "claude".to_string(),
                assessment: "ok".to_string(),
                concerns: concerns.iter().map(|c| c.to_string()).collect(),
                agrees: None,
            }],
            summary: String::new(),
            critique_count: 1,
            partial: false,
        }
    }

    #[test]
    fn test_disabled_never_triggers() {
        let policy = DisabledShortCircuit;
        let round = r1(&[("a", "Ship"), ("b", "Ship"), ("c", "Ship")]);
        assert!(policy.after_independent(&round).is_none());
        let reviews = RoundResult::new(Round::CrossReview, 0);
        assert!(policy.after_review(&round, &reviews).is_none());
    }

    #[test]
    fn test_unanimous_after_independent() {
        let policy = UnanimousRecommendation::default();
        let round = r1(&[("a", "Use Postgres."), ("b", "use  postgres"), ("c", "USE POSTGRES")]);
        let verdict = policy.after_independent(&round).unwrap();
        assert_eq!(verdict.confidence_cap, Confidence::Medium);

        let split = r1(&[("a", "Use Postgres"), ("b", "Use SQLite")]);
        assert!(policy.after_independent(&split).is_none());
    }

    #[test]
    fn test_single_opinion_is_not_unanimous() {
        let policy = UnanimousRecommendation::default();
        assert!(policy.after_independent(&r1(&[("a", "Ship")])).is_none());
        assert!(policy.after_independent(&r1(&[("a", ""), ("b", "")])).is_none());
    }

    #[test]
    fn test_unanimous_after_review() {
        let policy = UnanimousRecommendation::default();
        let round = r1(&[("a", "Ship"), ("b", "Ship")]);

        let mut reviews = RoundResult::new(Round::CrossReview, 0);
        reviews.outputs.push(review("a", &[]));
        assert!(policy.after_review(&round, &reviews).is_some());

        reviews.outputs.push(review("b", &["No rollback"]));
        assert!(policy.after_review(&round, &reviews).is_none());
    }

    #[test]
    fn test_decision_rounds_skipped() {
        let after_r1 =
            ShortCircuitDecision::from_verdict(Round::Independent, ShortCircuitVerdict::new("x"));
        assert_eq!(
            after_r1.rounds_skipped,
            vec![Round::CrossReview, Round::Synthesis]
        );
        assert!(after_r1.skips(Round::CrossReview));

        let after_r2 =
            ShortCircuitDecision::from_verdict(Round::CrossReview, ShortCircuitVerdict::new("y"));
        assert_eq!(after_r2.rounds_skipped, vec![Round::Synthesis]);
        assert!(!after_r2.skips(Round::CrossReview));
    }

    #[test]
    fn test_cap_cannot_be_lifted() {
        let verdict = ShortCircuitVerdict::new("x").with_cap(Confidence::High);
        assert_eq!(verdict.confidence_cap, Confidence::Medium);
        let verdict = ShortCircuitVerdict::new("x").with_cap(Confidence::Low);
        assert_eq!(
            ConfidenceAdjustment {
                cap: verdict.confidence_cap
            }
            .apply(Confidence::High),
            Confidence::Low
        );
    }
}
