//! Council run model
//!
//! Entities produced by each round, the settled round results they are
//! folded into, the run state machine, and the terminal outcome.

pub mod context;
pub mod entities;
pub mod fallback;
pub mod parsing;
pub mod report;
pub mod results;
pub mod state;

pub use context::{ContextPack, LabeledOpinion, OpinionLabels, RoundContext};
pub use entities::{ChairSynthesis, CouncilOpinion, CouncilReview, Critique};
pub use fallback::select_best_opinion;
pub use report::{
    AbortReason, AbortedRun, CouncilFinalReport, CouncilOutcome, Disclaimer, ReportBody,
    RoundTiming, RunMetrics, SettledRounds,
};
pub use results::{CallRecord, ProviderFailure, RoundOutput, RoundResult};
pub use state::{RunState, RunStateMachine};
