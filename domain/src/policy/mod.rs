//! Run policies
//!
//! Pure decision logic shared by the transports and the round executor:
//!
//! | Policy | Decides |
//! |--------|---------|
//! | [`QuorumPolicy`] | whether a settled round has enough successes |
//! | [`RetryPolicy`] | whether and when a failed call is retried, and what happens after |
//! | [`ShortCircuitPolicy`] | whether later rounds can be skipped |

pub mod quorum;
pub mod retry;
pub mod short_circuit;

pub use quorum::{QuorumCheck, QuorumPolicy};
pub use retry::{RetryAction, RetryPolicy};
pub use short_circuit::{
    ConfidenceAdjustment, DisabledShortCircuit, ShortCircuitDecision, ShortCircuitPolicy,
    ShortCircuitVerdict, UnanimousRecommendation,
};
