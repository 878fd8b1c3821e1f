//! Domain layer for llm-council
//!
//! Pure types and decision logic for a three-round council of language
//! model providers. No I/O lives here.
//!
//! # Core Concepts
//!
//! ## Rounds
//!
//! - **R1 Independent Opinions**: every participant answers on its own
//! - **R2 Cross Review**: participants critique each other's opinions
//! - **R3 Chair Synthesis**: the chair merges opinions and reviews into one report
//!
//! ## Policies
//!
//! - **Quorum**: minimum successes per round before the run may continue
//! - **Retry**: which failures are retried, with what backoff, and what follows
//! - **Short-circuit**: optional skipping of later rounds on early consensus
//!
//! ## Guarantees
//!
//! Every run ends in exactly one [`CouncilOutcome`]. A report that did not
//! come from a normal synthesis is always labelled as such.

pub mod config;
pub mod core;
pub mod council;
pub mod policy;
pub mod prompt;
pub mod provider;
pub mod transport;
pub mod util;

// Re-export commonly used types
pub use config::{
    ConfigIssue, ConfigIssueCode, CouncilConfig, ReviewMode, Severity, ShortCircuitMode, Timeouts,
};
pub use core::{confidence::Confidence, error::DomainError, error::ErrorType, round::Round};
pub use council::{
    AbortReason, AbortedRun, CallRecord, ChairSynthesis, ContextPack, CouncilFinalReport,
    CouncilOpinion, CouncilOutcome, CouncilReview, Critique, Disclaimer, OpinionLabels,
    ProviderFailure, ReportBody, RoundContext, RoundOutput, RoundResult, RunMetrics, RunState,
    RunStateMachine, SettledRounds,
};
pub use policy::{
    DisabledShortCircuit, QuorumPolicy, RetryAction, RetryPolicy, ShortCircuitDecision,
    ShortCircuitPolicy, UnanimousRecommendation,
};
pub use prompt::{DefaultPromptBuilder, PromptBuilder, PromptMetadata};
pub use provider::{
    PreparedRequest, ProviderAdapter, ProviderCapabilities, ProviderDescriptor, ProviderRegistry,
    RequestOptions, StandardAdapter,
};
pub use transport::{
    Message, Payload, Role, TransportError, TransportKind, TransportPreference, TransportRequest,
    TransportResult, TransportStatus, TransportUsed, Usage,
};
