//! Parallel dispatch of one round
//!
//! Every planned call runs in its own task on a [`JoinSet`]. The round
//! settles when all tasks have finished, when the round deadline passes, or
//! when the run is cancelled; outstanding calls are then aborted and
//! recorded as `timeout` or `cancelled` failures. Nothing is returned until
//! every task has stopped, so the next round never overlaps this one.

use super::dispatch::{CallOutcome, RoundTracker, call_with_retry, offset_ms};
use crate::ports::event_logger::{CouncilEvent, CouncilEventKind, CouncilEventLogger};
use crate::ports::progress::CouncilProgressNotifier;
use crate::transport::AutoTransport;
use council_domain::{
    CallRecord, DomainError, ErrorType, PreparedRequest, ProviderFailure, RetryPolicy, Round,
    RoundOutput, RoundResult, TransportStatus, TransportUsed,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shared handles for everything a run dispatches
pub(super) struct RunScope<'a> {
    pub transport: Arc<AutoTransport>,
    pub events: &'a dyn CouncilEventLogger,
    pub progress: &'a dyn CouncilProgressNotifier,
    pub cancel: &'a CancellationToken,
    pub run_start: Instant,
}

impl RunScope<'_> {
    pub fn elapsed_ms(&self) -> u64 {
        offset_ms(self.run_start)
    }

    /// Event stamped with the current run offset
    pub fn event(&self, kind: CouncilEventKind) -> CouncilEvent {
        CouncilEvent::new(kind, self.elapsed_ms())
    }
}

/// A request prepared for one provider
pub(super) struct PlannedCall {
    pub provider: String,
    pub prepared: PreparedRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Interruption {
    Deadline,
    Cancelled,
}

impl Interruption {
    fn error_type(&self) -> ErrorType {
        match self {
            Interruption::Deadline => ErrorType::Timeout,
            Interruption::Cancelled => ErrorType::Cancelled,
        }
    }
}

pub(super) struct FanOut<T> {
    pub result: RoundResult<T>,
    pub interrupted: Option<Interruption>,
}

impl<T> FanOut<T> {
    pub fn was_cancelled(&self) -> bool {
        self.interrupted == Some(Interruption::Cancelled)
    }
}

struct InFlight {
    attempts: Arc<AtomicU32>,
    started_ms: u64,
    truncated: bool,
}

/// Dispatch `calls` concurrently and settle them into one round result.
///
/// `parse` turns `(provider, model, content)` of a successful call into the
/// round's output; a parse error records the provider as `parse_error`.
pub(super) async fn fan_out<T, P>(
    scope: &RunScope<'_>,
    round: Round,
    calls: Vec<PlannedCall>,
    retry: RetryPolicy,
    deadline: Duration,
    mut parse: P,
) -> FanOut<T>
where
    T: RoundOutput,
    P: FnMut(&str, &str, &str) -> Result<T, DomainError>,
{
    let started_ms = scope.elapsed_ms();
    let order: Vec<String> = calls.iter().map(|c| c.provider.clone()).collect();
    let mut result = RoundResult::new(round, started_ms);

    info!(
        "{}: dispatching {} provider(s), deadline {}ms",
        round.display_name(),
        calls.len(),
        deadline.as_millis()
    );
    scope.progress.on_round_start(round, calls.len());
    scope.events.log(
        scope
            .event(CouncilEventKind::RoundStarted)
            .in_round(round)
            .with_fields(json!({
                "providers": order,
                "deadline_ms": deadline.as_millis() as u64,
            })),
    );

    let tracker = Arc::new(RoundTracker::new(calls.len()));
    let mut in_flight: HashMap<String, InFlight> = HashMap::new();
    let mut task_providers = HashMap::new();
    let mut join_set = JoinSet::new();

    if scope.cancel.is_cancelled() {
        for call in calls {
            in_flight.insert(
                call.provider,
                InFlight {
                    attempts: Arc::new(AtomicU32::new(0)),
                    started_ms,
                    truncated: call.prepared.metadata.truncated,
                },
            );
        }
    } else {
        for call in calls {
            let truncated = call.prepared.metadata.truncated;
            if truncated {
                debug!(
                    provider = %call.provider,
                    sections = ?call.prepared.metadata.truncated_sections,
                    "Prompt truncated to fit the context window"
                );
            }
            let attempts = Arc::new(AtomicU32::new(0));
            let handle = join_set.spawn(call_with_retry(
                Arc::clone(&scope.transport),
                call.prepared.request,
                round,
                retry,
                Arc::clone(&tracker),
                Arc::clone(&attempts),
                scope.run_start,
            ));
            task_providers.insert(handle.id(), call.provider.clone());
            in_flight.insert(
                call.provider,
                InFlight {
                    attempts,
                    started_ms,
                    truncated,
                },
            );
        }
    }

    let sleep = tokio::time::sleep(deadline);
    tokio::pin!(sleep);

    let interrupted = loop {
        tokio::select! {
            biased;
            _ = scope.cancel.cancelled() => break Some(Interruption::Cancelled),
            _ = &mut sleep => break Some(Interruption::Deadline),
            joined = join_set.join_next_with_id() => match joined {
                None => break None,
                Some(Ok((_, outcome))) => {
                    let truncated = in_flight
                        .remove(&outcome.provider)
                        .is_some_and(|f| f.truncated);
                    settle_outcome(scope, &mut result, outcome, truncated, &mut parse);
                }
                Some(Err(e)) => {
                    let Some(provider) = task_providers.get(&e.id()) else {
                        warn!("Task join error: {}", e);
                        continue;
                    };
                    warn!("{} task failed: {}", provider, e);
                    if let Some(flight) = in_flight.remove(provider) {
                        let failure = ProviderFailure::new(provider.as_str(), round, ErrorType::Network)
                            .with_message(format!("task failed: {}", e));
                        record_unsettled(scope, &mut result, failure, &flight);
                    }
                }
            }
        }
    };

    if let Some(interruption) = interrupted {
        join_set.shutdown().await;
        let message = match interruption {
            Interruption::Deadline => format!("round deadline of {}ms passed", deadline.as_millis()),
            Interruption::Cancelled => "run cancelled".to_string(),
        };
        warn!(
            "{}: {} with {} call(s) outstanding",
            round.display_name(),
            message,
            in_flight.len()
        );
        for provider in &order {
            if let Some(flight) = in_flight.remove(provider) {
                let failure = ProviderFailure::new(provider.as_str(), round, interruption.error_type())
                    .with_message(message.clone())
                    .with_retried(flight.attempts.load(Ordering::Acquire) > 1);
                record_unsettled(scope, &mut result, failure, &flight);
            }
        }
    }

    result.settled_ms = scope.elapsed_ms();
    result.sort_by_participants(&order);

    info!(
        "{} settled: {} succeeded, {} failed",
        round.display_name(),
        result.success_count(),
        result.failures.len()
    );
    scope
        .progress
        .on_round_complete(round, result.success_count(), result.failures.len());
    scope.events.log(
        scope
            .event(CouncilEventKind::RoundSettled)
            .in_round(round)
            .with_fields(json!({
                "succeeded": result.succeeded_providers().collect::<Vec<_>>(),
                "failed": result.failed_providers().collect::<Vec<_>>(),
                "duration_ms": result.duration_ms(),
                "interrupted": interrupted.map(|i| i.error_type()),
            })),
    );

    FanOut {
        result,
        interrupted,
    }
}

fn settle_outcome<T, P>(
    scope: &RunScope<'_>,
    result: &mut RoundResult<T>,
    outcome: CallOutcome,
    truncated: bool,
    parse: &mut P,
) where
    T: RoundOutput,
    P: FnMut(&str, &str, &str) -> Result<T, DomainError>,
{
    let round = result.round;
    let transport = &outcome.result;
    result.calls.push(CallRecord {
        provider: outcome.provider.clone(),
        round,
        attempts: outcome.attempts,
        status: transport.status,
        transport_used: transport.transport_used,
        fallback: transport.fallback,
        latency_ms: transport.latency_ms,
        usage: transport.usage,
        started_ms: outcome.started_ms,
        ended_ms: outcome.ended_ms,
        truncated,
    });

    let parsed = if transport.is_ok() {
        let content = transport.content.as_deref().unwrap_or("");
        parse(&outcome.provider, &outcome.model, content).map_err(|e| {
            ProviderFailure::new(outcome.provider.as_str(), round, ErrorType::ParseError)
                .with_message(e.to_string())
        })
    } else {
        Err(ProviderFailure::new(
            outcome.provider.as_str(),
            round,
            transport.error_type().unwrap_or(ErrorType::Network),
        )
        .with_message(transport.error_message()))
    };

    match parsed {
        Ok(output) => {
            debug!(
                provider = %outcome.provider,
                round = round.as_str(),
                latency_ms = transport.latency_ms,
                transport = ?transport.transport_used,
                "Provider call succeeded"
            );
            scope.progress.on_provider_complete(round, &outcome.provider, true);
            scope.events.log(
                scope
                    .event(CouncilEventKind::ProviderCall)
                    .in_round(round)
                    .for_provider(outcome.provider.as_str())
                    .with_fields(json!({
                        "model": outcome.model,
                        "attempts": outcome.attempts,
                        "latency_ms": transport.latency_ms,
                        "transport_used": transport.transport_used,
                        "fallback": transport.fallback,
                        "usage": transport.usage,
                        "truncated": truncated,
                    })),
            );
            result.outputs.push(output);
        }
        Err(failure) => {
            let failure = failure
                .with_retried(outcome.attempts > 1)
                .with_fallback(transport.fallback);
            warn!(
                "{} failed in {}: {} ({})",
                failure.provider,
                round.as_str(),
                failure.error_type,
                failure.message
            );
            scope.progress.on_provider_complete(round, &outcome.provider, false);
            scope.events.log(
                scope
                    .event(CouncilEventKind::ProviderFailed)
                    .in_round(round)
                    .for_provider(failure.provider.as_str())
                    .with_fields(json!({
                        "error_type": failure.error_type,
                        "message": failure.message,
                        "attempts": outcome.attempts,
                        "action": outcome.action,
                        "fallback_used": failure.fallback_used,
                    })),
            );
            result.failures.push(failure);
        }
    }
}

/// Record a call that never produced a transport result.
fn record_unsettled<T: RoundOutput>(
    scope: &RunScope<'_>,
    result: &mut RoundResult<T>,
    failure: ProviderFailure,
    flight: &InFlight,
) {
    let now = scope.elapsed_ms();
    result.calls.push(CallRecord {
        provider: failure.provider.clone(),
        round: failure.round,
        attempts: flight.attempts.load(Ordering::Acquire),
        status: TransportStatus::Error,
        transport_used: TransportUsed::None,
        fallback: false,
        latency_ms: now.saturating_sub(flight.started_ms),
        usage: None,
        started_ms: flight.started_ms,
        ended_ms: now,
        truncated: flight.truncated,
    });
    scope
        .progress
        .on_provider_complete(failure.round, &failure.provider, false);
    scope.events.log(
        scope
            .event(CouncilEventKind::ProviderFailed)
            .in_round(failure.round)
            .for_provider(failure.provider.as_str())
            .with_fields(json!({
                "error_type": failure.error_type,
                "message": failure.message,
                "attempts": flight.attempts.load(Ordering::Acquire),
            })),
    );
    result.failures.push(failure);
}
