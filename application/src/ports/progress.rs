//! Progress notification port
//!
//! Defines the interface for reporting progress during a council run.

use council_domain::{Round, ShortCircuitDecision};

/// Callback for progress updates during a council run
///
/// Implementations live outside the core and can display progress in
/// various ways (console, web UI, etc.)
pub trait CouncilProgressNotifier: Send + Sync {
    /// Called when a round starts dispatching
    fn on_round_start(&self, round: Round, total_providers: usize);

    /// Called when one provider's call in a round settles
    fn on_provider_complete(&self, round: Round, provider: &str, success: bool);

    /// Called when a round settles
    fn on_round_complete(&self, round: Round, succeeded: usize, failed: usize);

    /// Called when later rounds are skipped
    fn on_short_circuit(&self, _decision: &ShortCircuitDecision) {}
}

/// No-op progress notifier for when progress reporting is not needed
pub struct NoProgress;

impl CouncilProgressNotifier for NoProgress {
    fn on_round_start(&self, _round: Round, _total_providers: usize) {}
    fn on_provider_complete(&self, _round: Round, _provider: &str, _success: bool) {}
    fn on_round_complete(&self, _round: Round, _succeeded: usize, _failed: usize) {}
}
