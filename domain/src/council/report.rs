//! Terminal artifacts of a run
//!
//! Every run ends in exactly one [`CouncilOutcome`]: a completed
//! [`CouncilFinalReport`] or an explicit [`AbortedRun`]. A report that did
//! not come from a normal chair synthesis says so in its body: short-circuited
//! reports carry the [`ShortCircuitDecision`], degraded ones a mandatory
//! [`Disclaimer`].

use super::entities::{ChairSynthesis, CouncilOpinion, CouncilReview};
use super::results::{CallRecord, RoundResult};
use super::state::RunState;
use crate::core::confidence::Confidence;
use crate::core::error::ErrorType;
use crate::core::round::Round;
use crate::policy::ShortCircuitDecision;
use crate::transport::{TransportUsed, Usage};
use serde::{Deserialize, Serialize};

/// Why a report is degraded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disclaimer {
    pub error_type: ErrorType,
    /// Chair whose synthesis failed
    pub chair: String,
    /// Provider whose R1 opinion stands in for the synthesis
    pub fallback_provider: String,
    pub message: String,
}

impl Disclaimer {
    pub fn chair_failure(
        chair: impl Into<String>,
        fallback_provider: impl Into<String>,
        detail: &str,
    ) -> Self {
        let chair = chair.into();
        let fallback_provider = fallback_provider.into();
        let message = format!(
            "DEGRADED: chair '{}' failed to synthesize ({}); showing the best independent opinion from '{}' without cross-review synthesis",
            chair, detail, fallback_provider
        );
        Self {
            error_type: ErrorType::ChairFailure,
            chair,
            fallback_provider,
            message,
        }
    }
}

/// Where the report's content came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportBody {
    /// Normal chair synthesis
    Synthesis { synthesis: ChairSynthesis },
    /// Later rounds were skipped; the R1 consensus opinion stands
    ShortCircuit {
        decision: ShortCircuitDecision,
        opinion: CouncilOpinion,
    },
    /// The chair failed; the best R1 opinion stands
    Degraded {
        disclaimer: Disclaimer,
        opinion: CouncilOpinion,
    },
}

/// Every round result that settled, in order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettledRounds {
    pub independent: RoundResult<CouncilOpinion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_review: Option<RoundResult<CouncilReview>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<RoundResult<ChairSynthesis>>,
}

impl SettledRounds {
    pub fn new(independent: RoundResult<CouncilOpinion>) -> Self {
        Self {
            independent,
            cross_review: None,
            synthesis: None,
        }
    }

    /// Call records of every round, in round order
    pub fn calls(&self) -> impl Iterator<Item = &CallRecord> {
        self.independent
            .calls
            .iter()
            .chain(self.cross_review.iter().flat_map(|r| r.calls.iter()))
            .chain(self.synthesis.iter().flat_map(|r| r.calls.iter()))
    }

    fn timings(&self) -> Vec<RoundTiming> {
        let mut timings = vec![RoundTiming::of(&self.independent)];
        if let Some(r2) = &self.cross_review {
            timings.push(RoundTiming::of(r2));
        }
        if let Some(r3) = &self.synthesis {
            timings.push(RoundTiming::of(r3));
        }
        timings
    }
}

/// When a round ran, relative to run start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundTiming {
    pub round: Round,
    pub started_ms: u64,
    pub settled_ms: u64,
    pub duration_ms: u64,
}

impl RoundTiming {
    fn of<T: super::results::RoundOutput>(result: &RoundResult<T>) -> Self {
        Self {
            round: result.round,
            started_ms: result.started_ms,
            settled_ms: result.settled_ms,
            duration_ms: result.duration_ms(),
        }
    }
}

/// Run metrics as data, for an external transparency record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub calls: Vec<CallRecord>,
    pub rounds: Vec<RoundTiming>,
    pub rounds_skipped: Vec<Round>,
    pub usage: Usage,
    pub total_latency_ms: u64,
    /// Calls answered by the secondary channel after leaving the primary
    pub fallback_calls: usize,
    pub duration_ms: u64,
}

impl RunMetrics {
    pub fn collect(rounds: &SettledRounds, rounds_skipped: Vec<Round>, duration_ms: u64) -> Self {
        let calls: Vec<CallRecord> = rounds.calls().cloned().collect();
        let mut usage = Usage::default();
        for u in calls.iter().filter_map(|c| c.usage.as_ref()) {
            usage.add(u);
        }
        Self {
            total_latency_ms: calls.iter().map(|c| c.latency_ms).sum(),
            fallback_calls: calls.iter().filter(|c| c.fallback).count(),
            usage,
            rounds: rounds.timings(),
            rounds_skipped,
            calls,
            duration_ms,
        }
    }

    /// Calls that went out over `channel`
    pub fn calls_via(&self, channel: TransportUsed) -> usize {
        self.calls
            .iter()
            .filter(|c| c.transport_used == channel)
            .count()
    }
}

/// The authoritative result of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouncilFinalReport {
    pub question: String,
    pub body: ReportBody,
    /// Reported confidence after any short-circuit cap
    pub confidence: Confidence,
    pub rounds: SettledRounds,
    pub metrics: RunMetrics,
    pub state_history: Vec<RunState>,
}

impl CouncilFinalReport {
    pub fn is_degraded(&self) -> bool {
        matches!(self.body, ReportBody::Degraded { .. })
    }

    pub fn is_short_circuited(&self) -> bool {
        matches!(self.body, ReportBody::ShortCircuit { .. })
    }

    pub fn disclaimer(&self) -> Option<&Disclaimer> {
        match &self.body {
            ReportBody::Degraded { disclaimer, .. } => Some(disclaimer),
            _ => None,
        }
    }

    pub fn short_circuit(&self) -> Option<&ShortCircuitDecision> {
        match &self.body {
            ReportBody::ShortCircuit { decision, .. } => Some(decision),
            _ => None,
        }
    }

    /// Main text of the report
    pub fn content(&self) -> String {
        match &self.body {
            ReportBody::Synthesis { synthesis } => synthesis.content.clone(),
            ReportBody::ShortCircuit { opinion, .. } | ReportBody::Degraded { opinion, .. } => {
                render_opinion(opinion)
            }
        }
    }

    pub fn recommendation(&self) -> Option<&str> {
        match &self.body {
            ReportBody::Synthesis { synthesis } => synthesis.recommendation.as_deref(),
            ReportBody::ShortCircuit { opinion, .. } | ReportBody::Degraded { opinion, .. } => {
                Some(opinion.recommendation.as_str())
            }
        }
    }

    /// Provider whose output the report stands on
    pub fn source_provider(&self) -> &str {
        match &self.body {
            ReportBody::Synthesis { synthesis } => &synthesis.provider,
            ReportBody::ShortCircuit { opinion, .. } | ReportBody::Degraded { opinion, .. } => {
                &opinion.provider
            }
        }
    }
}

fn render_opinion(opinion: &CouncilOpinion) -> String {
    let mut out = opinion.recommendation.clone();
    if !opinion.rationale.is_empty() {
        out.push_str("\n\n");
        out.push_str(&opinion.rationale);
    }
    if !opinion.risks.is_empty() {
        out.push_str("\n\nRisks:");
        for risk in &opinion.risks {
            out.push_str("\n- ");
            out.push_str(risk);
        }
    }
    out
}

/// Why a run stopped without a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    QuorumUnmet {
        round: Round,
        succeeded: usize,
        required: usize,
    },
    /// The caller cancelled while the run was in `state`
    Cancelled { state: RunState },
}

impl AbortReason {
    pub fn error_type(&self) -> ErrorType {
        match self {
            AbortReason::QuorumUnmet { .. } => ErrorType::QuorumUnmet,
            AbortReason::Cancelled { .. } => ErrorType::Cancelled,
        }
    }
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::QuorumUnmet {
                round,
                succeeded,
                required,
            } => write!(
                f,
                "{} quorum unmet: {} of {} required responses",
                round.as_str(),
                succeeded,
                required
            ),
            AbortReason::Cancelled { state } => write!(f, "cancelled during {}", state),
        }
    }
}

/// Explicitly partial result of a run that did not complete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbortedRun {
    pub question: String,
    pub reason: AbortReason,
    /// State the run was in when it aborted
    pub state: RunState,
    pub rounds: SettledRounds,
    pub metrics: RunMetrics,
    pub state_history: Vec<RunState>,
}

/// Exactly one per run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CouncilOutcome {
    Completed(CouncilFinalReport),
    Aborted(AbortedRun),
}

impl CouncilOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CouncilOutcome::Completed(_))
    }

    pub fn report(&self) -> Option<&CouncilFinalReport> {
        match self {
            CouncilOutcome::Completed(report) => Some(report),
            CouncilOutcome::Aborted(_) => None,
        }
    }

    pub fn aborted(&self) -> Option<&AbortedRun> {
        match self {
            CouncilOutcome::Completed(_) => None,
            CouncilOutcome::Aborted(run) => Some(run),
        }
    }

    pub fn rounds(&self) -> &SettledRounds {
        match self {
            CouncilOutcome::Completed(report) => &report.rounds,
            CouncilOutcome::Aborted(run) => &run.rounds,
        }
    }

    pub fn metrics(&self) -> &RunMetrics {
        match self {
            CouncilOutcome::Completed(report) => &report.metrics,
            CouncilOutcome::Aborted(run) => &run.metrics,
        }
    }
}
