//! Single provider call with retry
//!
//! Runs inside a spawned task. Every attempt goes through the
//! [`AutoTransport`], so a retry may land on a different channel than the
//! attempt before it.

use crate::transport::AutoTransport;
use council_domain::{RetryAction, RetryPolicy, Round, TransportRequest, TransportResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Shared failure bookkeeping for one round's calls
#[derive(Debug)]
pub(super) struct RoundTracker {
    dispatched: usize,
    failed: AtomicUsize,
}

impl RoundTracker {
    pub(super) fn new(dispatched: usize) -> Self {
        Self {
            dispatched,
            failed: AtomicUsize::new(0),
        }
    }

    /// Other providers in the round that have not failed yet
    fn others_remaining(&self) -> usize {
        self.dispatched
            .saturating_sub(1)
            .saturating_sub(self.failed.load(Ordering::Acquire))
    }

    fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::AcqRel);
    }
}

/// What one call settled to, before schema parsing
#[derive(Debug, Clone)]
pub(super) struct CallOutcome {
    pub provider: String,
    pub model: String,
    pub result: TransportResult,
    pub attempts: u32,
    pub started_ms: u64,
    pub ended_ms: u64,
    /// Advisory action once retries were spent; `None` on success
    pub action: Option<RetryAction>,
}

pub(super) fn offset_ms(run_start: Instant) -> u64 {
    run_start.elapsed().as_millis() as u64
}

/// Send `request` until it succeeds or the retry policy gives up.
pub(super) async fn call_with_retry(
    transport: Arc<AutoTransport>,
    request: TransportRequest,
    round: Round,
    retry: RetryPolicy,
    tracker: Arc<RoundTracker>,
    attempts: Arc<AtomicU32>,
    run_start: Instant,
) -> CallOutcome {
    let started_ms = offset_ms(run_start);
    let mut retries_done = 0;

    loop {
        attempts.fetch_add(1, Ordering::AcqRel);
        let result = transport.send(&request).await;

        if result.is_ok() {
            return CallOutcome {
                provider: request.provider,
                model: request.model,
                result,
                attempts: attempts.load(Ordering::Acquire),
                started_ms,
                ended_ms: offset_ms(run_start),
                action: None,
            };
        }

        match retry.next_action(round, &result, retries_done, tracker.others_remaining()) {
            RetryAction::Retry { delay_ms } => {
                warn!(
                    "{} {} call failed ({}), retrying in {}ms",
                    request.provider,
                    round.as_str(),
                    result.error_message(),
                    delay_ms
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                retries_done += 1;
            }
            action => {
                tracker.record_failure();
                debug!(
                    provider = %request.provider,
                    round = round.as_str(),
                    ?action,
                    "Retries exhausted"
                );
                return CallOutcome {
                    provider: request.provider,
                    model: request.model,
                    result,
                    attempts: attempts.load(Ordering::Acquire),
                    started_ms,
                    ended_ms: offset_ms(run_start),
                    action: Some(action),
                };
            }
        }
    }
}
