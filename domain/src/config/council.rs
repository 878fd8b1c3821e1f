//! Run configuration
//!
//! [`CouncilConfig`] enumerates every option a council run recognizes.
//! Defaults:
//!
//! | Option | Default |
//! |--------|---------|
//! | `participants` | `claude`, `codex`, `gemini` |
//! | `chair` | first chair-eligible participant |
//! | `transport_preference` | `auto` |
//! | `timeouts.default_provider_ms` | 120000 |
//! | `timeouts.availability_ms` / `availability_ttl_ms` | 3000 / 5000 |
//! | `quorum` | `r1_min = 2`, `r2_min = 1`, `r3_required = true` |
//! | `retry` | 1 retry, 1000ms doubling to 10000ms, 10% jitter |
//! | `short_circuit` | `disabled` |
//! | `allow_partial` | `false` |
//! | `review_mode` | `anonymized` |
//! | `exclude_self_review` | `true` |
//! | `temperature` | 0.2 |

use super::validation::{ConfigIssue, ConfigIssueCode};
use crate::core::round::Round;
use crate::policy::{
    DisabledShortCircuit, QuorumPolicy, RetryPolicy, ShortCircuitPolicy, UnanimousRecommendation,
};
use crate::transport::TransportPreference;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// How R1 opinions are presented to reviewers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReviewMode {
    /// Opinions are shown as "Response A", "Response B", ...
    #[default]
    Anonymized,
    /// Opinions are shown under their provider name
    Labeled,
}

impl ReviewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewMode::Anonymized => "anonymized",
            ReviewMode::Labeled => "labeled",
        }
    }
}

impl std::str::FromStr for ReviewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anonymized" | "anonymous" | "anon" => Ok(ReviewMode::Anonymized),
            "labeled" | "labelled" | "named" => Ok(ReviewMode::Labeled),
            other => Err(format!(
                "Unknown review mode: {}. Valid: anonymized, labeled",
                other
            )),
        }
    }
}

/// Built-in short-circuit policy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShortCircuitMode {
    #[default]
    Disabled,
    Unanimous,
}

impl ShortCircuitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShortCircuitMode::Disabled => "disabled",
            ShortCircuitMode::Unanimous => "unanimous",
        }
    }

    pub fn policy(&self) -> Arc<dyn ShortCircuitPolicy> {
        match self {
            ShortCircuitMode::Disabled => Arc::new(DisabledShortCircuit),
            ShortCircuitMode::Unanimous => Arc::new(UnanimousRecommendation::default()),
        }
    }
}

impl std::str::FromStr for ShortCircuitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disabled" | "off" | "none" => Ok(ShortCircuitMode::Disabled),
            "unanimous" => Ok(ShortCircuitMode::Unanimous),
            other => Err(format!(
                "Unknown short-circuit policy: {}. Valid: disabled, unanimous",
                other
            )),
        }
    }
}

/// Per-round deadlines, per-provider timeouts and availability-check timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub r1_ms: Option<u64>,
    pub r2_ms: Option<u64>,
    pub r3_ms: Option<u64>,
    pub provider_ms: BTreeMap<String, u64>,
    pub default_provider_ms: u64,
    pub availability_ms: u64,
    pub availability_ttl_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            r1_ms: None,
            r2_ms: None,
            r3_ms: None,
            provider_ms: BTreeMap::new(),
            default_provider_ms: 120_000,
            availability_ms: 3_000,
            availability_ttl_ms: 5_000,
        }
    }
}

impl Timeouts {
    pub fn provider_timeout_ms(&self, provider: &str) -> u64 {
        self.provider_ms
            .get(provider)
            .copied()
            .unwrap_or(self.default_provider_ms)
    }

    /// Explicit deadline configured for a round, if any
    pub fn explicit_round_ms(&self, round: Round) -> Option<u64> {
        match round {
            Round::Independent => self.r1_ms,
            Round::CrossReview => self.r2_ms,
            Round::Synthesis => self.r3_ms,
        }
    }

    /// Deadline of a fan-out round: the explicit round value when set,
    /// otherwise the largest timeout among the dispatched providers.
    pub fn round_deadline<'a>(
        &self,
        round: Round,
        providers: impl IntoIterator<Item = &'a str>,
    ) -> Duration {
        let ms = self.explicit_round_ms(round).unwrap_or_else(|| {
            providers
                .into_iter()
                .map(|p| self.provider_timeout_ms(p))
                .max()
                .unwrap_or(self.default_provider_ms)
        });
        Duration::from_millis(ms)
    }

    /// Availability-check timeout, never longer than the shortest request timeout.
    pub fn availability_timeout(&self) -> Duration {
        let shortest = self
            .provider_ms
            .values()
            .copied()
            .chain(std::iter::once(self.default_provider_ms))
            .min()
            .unwrap_or(self.default_provider_ms);
        Duration::from_millis(self.availability_ms.min(shortest))
    }

    pub fn availability_ttl(&self) -> Duration {
        Duration::from_millis(self.availability_ttl_ms)
    }
}

/// Every option a council run recognizes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CouncilConfig {
    pub participants: Vec<String>,
    pub chair: Option<String>,
    pub transport_preference: TransportPreference,
    pub timeouts: Timeouts,
    pub quorum: QuorumPolicy,
    pub retry: RetryPolicy,
    pub short_circuit: ShortCircuitMode,
    /// Continue with whatever succeeded when a round misses its quorum
    pub allow_partial: bool,
    pub review_mode: ReviewMode,
    /// In labeled mode, keep reviewers from critiquing their own opinion
    pub exclude_self_review: bool,
    pub temperature: f32,
    /// Upper bound on requested output tokens, below the adapter's own limit
    pub max_output_tokens: Option<u32>,
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            participants: vec![
                "claude".to_string(),
                "codex".to_string(),
                "gemini".to_string(),
            ],
            chair: None,
            transport_preference: TransportPreference::Auto,
            timeouts: Timeouts::default(),
            quorum: QuorumPolicy::default(),
            retry: RetryPolicy::default(),
            short_circuit: ShortCircuitMode::Disabled,
            allow_partial: false,
            review_mode: ReviewMode::Anonymized,
            exclude_self_review: true,
            temperature: 0.2,
            max_output_tokens: None,
        }
    }
}

impl CouncilConfig {
    pub fn new(participants: Vec<String>) -> Self {
        Self {
            participants,
            ..Default::default()
        }
    }

    pub fn with_chair(mut self, chair: impl Into<String>) -> Self {
        self.chair = Some(chair.into());
        self
    }

    pub fn with_quorum(mut self, quorum: QuorumPolicy) -> Self {
        self.quorum = quorum;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_allow_partial(mut self, allow_partial: bool) -> Self {
        self.allow_partial = allow_partial;
        self
    }

    pub fn with_review_mode(mut self, review_mode: ReviewMode) -> Self {
        self.review_mode = review_mode;
        self
    }

    pub fn with_short_circuit(mut self, mode: ShortCircuitMode) -> Self {
        self.short_circuit = mode;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_transport_preference(mut self, preference: TransportPreference) -> Self {
        self.transport_preference = preference;
        self
    }

    /// Whether a reviewer's own opinion is hidden from it in R2
    pub fn hides_own_opinion(&self) -> bool {
        self.review_mode == ReviewMode::Labeled && self.exclude_self_review
    }

    /// Check internal consistency. Registry-dependent checks (unknown
    /// providers, chair eligibility) happen when participants are resolved.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.participants.is_empty() {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::EmptyName {
                    field: "participants".to_string(),
                },
                "participants: at least one provider is required",
            ));
        }

        let mut seen = HashSet::new();
        for name in &self.participants {
            if name.trim().is_empty() {
                issues.push(ConfigIssue::error(
                    ConfigIssueCode::EmptyName {
                        field: "participants".to_string(),
                    },
                    "participants: empty provider name",
                ));
            } else if !seen.insert(name.as_str()) {
                issues.push(ConfigIssue::warning(
                    ConfigIssueCode::DuplicateProvider { name: name.clone() },
                    format!("participants: '{}' listed more than once", name),
                ));
            }
        }

        if let Some(chair) = &self.chair
            && chair.trim().is_empty()
        {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::EmptyName {
                    field: "chair".to_string(),
                },
                "chair: empty provider name",
            ));
        }

        for (field, min) in [
            ("quorum.r1_min", self.quorum.r1_min),
            ("quorum.r2_min", self.quorum.r2_min),
        ] {
            if min == 0 {
                issues.push(ConfigIssue::warning(
                    ConfigIssueCode::InvalidConstraint {
                        field: field.to_string(),
                        reason: "zero".to_string(),
                    },
                    format!("{}: 0 means the round can never fail its quorum", field),
                ));
            }
        }

        let available = seen.len();
        if !self.allow_partial && !self.participants.is_empty() && self.quorum.r1_min > available {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::QuorumUnreachable {
                    field: "quorum.r1_min".to_string(),
                    required: self.quorum.r1_min,
                    available,
                },
                format!(
                    "quorum.r1_min: {} required but only {} participants configured",
                    self.quorum.r1_min, available
                ),
            ));
        }

        if self.retry.multiplier < 1.0 {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::InvalidConstraint {
                    field: "retry.multiplier".to_string(),
                    reason: "must be >= 1.0".to_string(),
                },
                format!("retry.multiplier: {} must be >= 1.0", self.retry.multiplier),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_ratio) {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::InvalidConstraint {
                    field: "retry.jitter_ratio".to_string(),
                    reason: "must be within 0.0..=1.0".to_string(),
                },
                format!(
                    "retry.jitter_ratio: {} must be within 0.0..=1.0",
                    self.retry.jitter_ratio
                ),
            ));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::InvalidConstraint {
                    field: "retry.initial_backoff_ms".to_string(),
                    reason: "exceeds max_backoff_ms".to_string(),
                },
                "retry.initial_backoff_ms exceeds retry.max_backoff_ms; every retry waits the cap",
            ));
        }

        if self.timeouts.default_provider_ms == 0 {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::InvalidConstraint {
                    field: "timeouts.default_provider_ms".to_string(),
                    reason: "zero".to_string(),
                },
                "timeouts.default_provider_ms must be greater than 0",
            ));
        }
        if self.timeouts.availability_ms > self.timeouts.default_provider_ms {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::InvalidConstraint {
                    field: "timeouts.availability_ms".to_string(),
                    reason: "exceeds the request timeout".to_string(),
                },
                "timeouts.availability_ms exceeds the request timeout and will be clamped",
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::InvalidConstraint {
                    field: "temperature".to_string(),
                    reason: "outside 0.0..=2.0".to_string(),
                },
                format!("temperature: {} is outside 0.0..=2.0", self.temperature),
            ));
        }

        issues
    }
}
