//! Settled round results
//!
//! A [`RoundResult`] is produced exactly once per executed round, after
//! every dispatched call has resolved or the round deadline has passed.
//! Later rounds read it but never mutate it.

use super::entities::{ChairSynthesis, CouncilOpinion, CouncilReview};
use crate::core::error::ErrorType;
use crate::core::round::Round;
use crate::transport::{TransportStatus, TransportUsed, Usage};
use serde::{Deserialize, Serialize};

/// Anything a round can produce, keyed by the provider that produced it
pub trait RoundOutput {
    fn provider(&self) -> &str;
}

impl RoundOutput for CouncilOpinion {
    fn provider(&self) -> &str {
        &self.provider
    }
}

impl RoundOutput for CouncilReview {
    fn provider(&self) -> &str {
        &self.provider
    }
}

impl RoundOutput for ChairSynthesis {
    fn provider(&self) -> &str {
        &self.provider
    }
}

/// A provider that produced no usable output in a round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub round: Round,
    pub error_type: ErrorType,
    pub message: String,
    /// At least one retry was attempted
    pub retried: bool,
    /// The last attempt reached the secondary channel, as the only channel
    /// or as a fallback after the primary failed
    pub fallback_used: bool,
}

impl ProviderFailure {
    pub fn new(provider: impl Into<String>, round: Round, error_type: ErrorType) -> Self {
        Self {
            provider: provider.into(),
            round,
            error_type,
            message: String::new(),
            retried: false,
            fallback_used: false,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_retried(mut self, retried: bool) -> Self {
        self.retried = retried;
        self
    }

    pub fn with_fallback(mut self, fallback_used: bool) -> Self {
        self.fallback_used = fallback_used;
        self
    }
}

/// Metrics for one provider call within a round (all attempts folded)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub provider: String,
    pub round: Round,
    pub attempts: u32,
    pub status: TransportStatus,
    pub transport_used: TransportUsed,
    pub fallback: bool,
    /// Latency of the final attempt as reported by the transport
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Offset from run start when the first attempt began
    pub started_ms: u64,
    /// Offset from run start when the call settled
    pub ended_ms: u64,
    /// The prompt had to be truncated to fit the context window
    #[serde(default)]
    pub truncated: bool,
}

/// Outcome of one settled round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResult<T> {
    pub round: Round,
    /// Successful outputs in participant order
    pub outputs: Vec<T>,
    pub failures: Vec<ProviderFailure>,
    pub calls: Vec<CallRecord>,
    /// Offset from run start when the round began dispatching
    pub started_ms: u64,
    /// Offset from run start when the round settled
    pub settled_ms: u64,
}

impl<T: RoundOutput> RoundResult<T> {
    pub fn new(round: Round, started_ms: u64) -> Self {
        Self {
            round,
            outputs: Vec::new(),
            failures: Vec::new(),
            calls: Vec::new(),
            started_ms,
            settled_ms: started_ms,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.settled_ms.saturating_sub(self.started_ms)
    }

    pub fn success_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn succeeded_providers(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|o| o.provider())
    }

    pub fn failed_providers(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.provider.as_str())
    }

    pub fn contains_provider(&self, provider: &str) -> bool {
        self.outputs.iter().any(|o| o.provider() == provider)
    }

    pub fn output_for(&self, provider: &str) -> Option<&T> {
        self.outputs.iter().find(|o| o.provider() == provider)
    }

    pub fn call_for(&self, provider: &str) -> Option<&CallRecord> {
        self.calls.iter().find(|c| c.provider == provider)
    }

    /// Sum of reported token usage across calls in this round
    pub fn usage(&self) -> Usage {
        let mut total = Usage::default();
        for usage in self.calls.iter().filter_map(|c| c.usage.as_ref()) {
            total.add(usage);
        }
        total
    }

    /// Order outputs and failures by the given participant order; unknown
    /// providers go last, by name.
    pub fn sort_by_participants(&mut self, order: &[String]) {
        let rank = |provider: &str| {
            order
                .iter()
                .position(|p| p == provider)
                .unwrap_or(usize::MAX)
        };
        self.outputs.sort_by(|a, b| {
            rank(a.provider())
                .cmp(&rank(b.provider()))
                .then_with(|| a.provider().cmp(b.provider()))
        });
        self.failures.sort_by(|a, b| {
            rank(&a.provider)
                .cmp(&rank(&b.provider))
                .then_with(|| a.provider.cmp(&b.provider))
        });
        self.calls.sort_by(|a, b| {
            rank(&a.provider)
                .cmp(&rank(&b.provider))
                .then_with(|| a.provider.cmp(&b.provider))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::confidence::Confidence;

    fn opinion(provider: &str) -> CouncilOpinion {
        CouncilOpinion {
            provider: provider.to_string(),
            model: format!("{}-model", provider),
            round: Round::Independent,
            timestamp: 0,
            recommendation: "Do it".to_string(),
            rationale: String::new(),
            risks: vec![],
            assumptions: vec![],
            confidence: Confidence::Medium,
            partial: false,
        }
    }

    fn call(provider: &str, usage: Option<Usage>) -> CallRecord {
        CallRecord {
            provider: provider.to_string(),
            round: Round::Independent,
            attempts: 1,
            status: TransportStatus::Ok,
            transport_used: TransportUsed::Primary,
            fallback: false,
            latency_ms: 10,
            usage,
            started_ms: 0,
            ended_ms: 10,
            truncated: false,
        }
    }

    #[test]
    fn test_sort_by_participants() {
        let mut result = RoundResult::new(Round::Independent, 0);
        result.outputs.push(opinion("gemini"));
        result.outputs.push(opinion("claude"));
        result.failures.push(ProviderFailure::new(
            "codex",
            Round::Independent,
            ErrorType::Timeout,
        ));

        let order = vec![
            "claude".to_string(),
            "codex".to_string(),
            "gemini".to_string(),
        ];
        result.sort_by_participants(&order);

        let providers: Vec<_> = result.succeeded_providers().collect();
        assert_eq!(providers, vec!["claude", "gemini"]);
        assert!(result.contains_provider("gemini"));
        assert!(!result.contains_provider("codex"));
        assert_eq!(result.failed_providers().collect::<Vec<_>>(), vec!["codex"]);
    }

    #[test]
    fn test_usage_aggregation() {
        let mut result: RoundResult<CouncilOpinion> = RoundResult::new(Round::Independent, 5);
        result.calls.push(call("claude", Some(Usage::new(100, 50))));
        result.calls.push(call("gemini", None));
        result.calls.push(call("codex", Some(Usage::new(10, 5))));
        result.settled_ms = 25;

        assert_eq!(result.usage(), Usage::new(110, 55));
        assert_eq!(result.duration_ms(), 20);
    }

    #[test]
    fn test_failure_builder() {
        let failure = ProviderFailure::new("claude", Round::CrossReview, ErrorType::RateLimit)
            .with_message("429")
            .with_retried(true)
            .with_fallback(true);
        assert!(failure.retried);
        assert!(failure.fallback_used);
        assert_eq!(failure.message, "429");
    }
}
