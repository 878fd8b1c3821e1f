//! Run Council use case
//!
//! Drives one council run through its rounds:
//!
//! 1. **R1** fan out the question to every participant
//! 2. **R2** fan out cross-reviews to the providers that answered
//! 3. **R3** ask the chair to synthesize, falling back to the best R1
//!    opinion when the chair fails
//!
//! Quorum is checked after each fan-out round, the short-circuit policy may
//! skip later rounds, and cancellation stops the run at the next await
//! point. Every run ends in exactly one [`CouncilOutcome`].

mod dispatch;
mod fanout;
mod independent;
mod review;
mod synthesis;


use crate::ports::event_logger::{CouncilEventKind, CouncilEventLogger, NoEventLogger};
use crate::ports::progress::{CouncilProgressNotifier, NoProgress};
use crate::ports::transport::Transport;
use crate::transport::AutoTransport;
use council_domain::council::select_best_opinion;
use council_domain::{
    AbortReason, AbortedRun, ConfigIssue, Confidence, ContextPack, CouncilConfig,
    CouncilFinalReport, CouncilOpinion, CouncilOutcome, Disclaimer, DomainError, OpinionLabels,
    ProviderAdapter, ProviderRegistry, ReportBody, RequestOptions, Round, RunMetrics, RunState,
    RunStateMachine, SettledRounds, ShortCircuitDecision, ShortCircuitPolicy,
};
use fanout::RunScope;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Errors that prevent a run from starting
///
/// Failures during a run never surface here: they end the run as an
/// [`AbortedRun`] or a degraded report.
#[derive(Error, Debug)]
pub enum RunCouncilError {
    #[error("Invalid configuration: {}", describe_issues(.0))]
    InvalidConfig(Vec<ConfigIssue>),

    #[error("No registered participants")]
    NoParticipants,

    #[error(transparent)]
    Domain(#[from] DomainError),
}

fn describe_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(|i| i.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Input for the RunCouncil use case
#[derive(Debug, Clone)]
pub struct RunCouncilInput {
    pub context: ContextPack,
    pub config: CouncilConfig,
}

impl RunCouncilInput {
    pub fn new(context: ContextPack, config: CouncilConfig) -> Self {
        Self { context, config }
    }
}

/// Use case for running a council
pub struct RunCouncilUseCase {
    registry: Arc<ProviderRegistry>,
    primary: Option<Arc<dyn Transport>>,
    secondary: Option<Arc<dyn Transport>>,
    event_logger: Arc<dyn CouncilEventLogger>,
    short_circuit: Option<Arc<dyn ShortCircuitPolicy>>,
}

impl RunCouncilUseCase {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        primary: Option<Arc<dyn Transport>>,
        secondary: Option<Arc<dyn Transport>>,
    ) -> Self {
        Self {
            registry,
            primary,
            secondary,
            event_logger: Arc::new(NoEventLogger),
            short_circuit: None,
        }
    }

    pub fn with_event_logger(mut self, logger: Arc<dyn CouncilEventLogger>) -> Self {
        self.event_logger = logger;
        self
    }

    /// Use `policy` instead of the one named by the run configuration.
    pub fn with_short_circuit_policy(mut self, policy: Arc<dyn ShortCircuitPolicy>) -> Self {
        self.short_circuit = Some(policy);
        self
    }

    /// Execute the use case with default (no-op) progress
    pub async fn execute(
        &self,
        input: RunCouncilInput,
        cancel: CancellationToken,
    ) -> Result<CouncilOutcome, RunCouncilError> {
        self.execute_with_progress(input, cancel, &NoProgress).await
    }

    /// Execute the use case with progress callbacks
    pub async fn execute_with_progress(
        &self,
        input: RunCouncilInput,
        cancel: CancellationToken,
        progress: &dyn CouncilProgressNotifier,
    ) -> Result<CouncilOutcome, RunCouncilError> {
        let RunCouncilInput {
            context: pack,
            config,
        } = input;

        let (errors, warnings): (Vec<_>, Vec<_>) =
            config.validate().into_iter().partition(|i| i.is_error());
        for issue in &warnings {
            warn!("{}", issue);
        }
        if !errors.is_empty() {
            return Err(RunCouncilError::InvalidConfig(errors));
        }

        let (participants, issues) = self.registry.participants(&config);
        for issue in &issues {
            warn!("{}", issue);
        }
        if participants.is_empty() {
            return Err(RunCouncilError::NoParticipants);
        }

        let (chair, issues) = self.registry.chair(&config)?;
        for issue in &issues {
            warn!("{}", issue);
        }

        let policy = self
            .short_circuit
            .clone()
            .unwrap_or_else(|| config.short_circuit.policy());
        let transport = Arc::new(
            AutoTransport::new(self.primary.clone(), self.secondary.clone())
                .with_preference(config.transport_preference),
        );

        let scope = RunScope {
            transport,
            events: self.event_logger.as_ref(),
            progress,
            cancel: &cancel,
            run_start: Instant::now(),
        };

        info!(
            "Starting council with {} participants, chair {}",
            participants.len(),
            chair.name()
        );
        scope.events.log(
            scope
                .event(CouncilEventKind::RunStarted)
                .with_fields(json!({
                    "question": pack.question,
                    "participants": participants.iter().map(|a| a.name()).collect::<Vec<_>>(),
                    "chair": chair.name(),
                    "transport_preference": config.transport_preference,
                    "quorum": config.quorum,
                    "short_circuit": policy.name(),
                })),
        );

        let run = CouncilRun {
            scope,
            pack: &pack,
            config: &config,
            policy: policy.as_ref(),
            machine: RunStateMachine::new(),
        };
        run.drive(&participants, &chair).await
    }
}

/// Per-call request settings drawn from the run configuration
fn request_options(config: &CouncilConfig, provider: &str) -> RequestOptions {
    RequestOptions {
        model: None,
        temperature: config.temperature,
        max_output_tokens: config.max_output_tokens,
        timeout_ms: config.timeouts.provider_timeout_ms(provider),
    }
}

/// State of one run in flight
struct CouncilRun<'a> {
    scope: RunScope<'a>,
    pack: &'a ContextPack,
    config: &'a CouncilConfig,
    policy: &'a dyn ShortCircuitPolicy,
    machine: RunStateMachine,
}

impl CouncilRun<'_> {
    async fn drive(
        mut self,
        participants: &[Arc<dyn ProviderAdapter>],
        chair: &Arc<dyn ProviderAdapter>,
    ) -> Result<CouncilOutcome, RunCouncilError> {
        // R1: independent opinions
        let r1 = independent::run_independent(&self.scope, participants, self.pack, self.config)
            .await;
        if r1.was_cancelled() {
            return self.abort_cancelled(SettledRounds::new(r1.result));
        }
        let r1 = r1.result;
        self.machine.transition(RunState::R1Settled)?;

        let check = self.config.quorum.check(Round::Independent, r1.success_count());
        if r1.success_count() == 0 || (!check.met && !self.config.allow_partial) {
            let reason = AbortReason::QuorumUnmet {
                round: Round::Independent,
                succeeded: r1.success_count(),
                required: check.required.max(1),
            };
            return self.abort(reason, SettledRounds::new(r1));
        }
        if !check.met {
            warn!(
                "R1 quorum unmet ({} of {}), continuing with partial results",
                check.succeeded, check.required
            );
        }

        if let Some(verdict) = self.policy.after_independent(&r1)
            && let Some(opinion) = select_best_opinion(&r1).cloned()
        {
            let decision = ShortCircuitDecision::from_verdict(Round::Independent, verdict);
            return self.short_circuit(decision, opinion, SettledRounds::new(r1));
        }

        if self.scope.cancel.is_cancelled() {
            return self.abort_cancelled(SettledRounds::new(r1));
        }

        // R2: cross review among providers that answered
        let labels = OpinionLabels::assign(r1.succeeded_providers(), self.config.review_mode);
        let reviewers: Vec<Arc<dyn ProviderAdapter>> = participants
            .iter()
            .filter(|a| r1.contains_provider(a.name()))
            .cloned()
            .collect();

        self.machine.transition(RunState::R2Pending)?;
        let r2 = review::run_review(
            &self.scope,
            &reviewers,
            self.pack,
            &r1.outputs,
            &labels,
            self.config,
        )
        .await;
        if r2.was_cancelled() {
            let mut rounds = SettledRounds::new(r1);
            rounds.cross_review = Some(r2.result);
            return self.abort_cancelled(rounds);
        }
        let r2 = r2.result;
        self.machine.transition(RunState::R2Settled)?;

        let check = self.config.quorum.check(Round::CrossReview, r2.success_count());
        if !check.met {
            if !self.config.allow_partial {
                let reason = AbortReason::QuorumUnmet {
                    round: Round::CrossReview,
                    succeeded: check.succeeded,
                    required: check.required,
                };
                let mut rounds = SettledRounds::new(r1);
                rounds.cross_review = Some(r2);
                return self.abort(reason, rounds);
            }
            warn!(
                "R2 quorum unmet ({} of {}), continuing with partial results",
                check.succeeded, check.required
            );
        }

        if let Some(verdict) = self.policy.after_review(&r1, &r2)
            && let Some(opinion) = select_best_opinion(&r1).cloned()
        {
            let decision = ShortCircuitDecision::from_verdict(Round::CrossReview, verdict);
            let mut rounds = SettledRounds::new(r1);
            rounds.cross_review = Some(r2);
            return self.short_circuit(decision, opinion, rounds);
        }

        if self.scope.cancel.is_cancelled() {
            let mut rounds = SettledRounds::new(r1);
            rounds.cross_review = Some(r2);
            return self.abort_cancelled(rounds);
        }

        // R3: chair synthesis
        self.machine.transition(RunState::R3Pending)?;
        let r3 = synthesis::run_synthesis(
            &self.scope,
            chair,
            self.pack,
            &r1.outputs,
            &r2.outputs,
            &labels,
            self.config,
        )
        .await;
        let cancelled = r3.was_cancelled();

        let mut rounds = SettledRounds::new(r1);
        rounds.cross_review = Some(r2);
        rounds.synthesis = Some(r3.result);
        if cancelled {
            return self.abort_cancelled(rounds);
        }
        self.machine.transition(RunState::R3Settled)?;

        let synthesis = rounds
            .synthesis
            .as_ref()
            .and_then(|r3| r3.outputs.first())
            .cloned();
        if let Some(synthesis) = synthesis {
            let confidence = synthesis.confidence;
            return Ok(self.complete(ReportBody::Synthesis { synthesis }, confidence, rounds, vec![]));
        }

        self.degraded(chair.name(), rounds)
    }

    /// Report the best R1 opinion in place of the failed synthesis.
    fn degraded(
        self,
        chair: &str,
        rounds: SettledRounds,
    ) -> Result<CouncilOutcome, RunCouncilError> {
        let detail = rounds
            .synthesis
            .as_ref()
            .and_then(|r3| r3.failures.first())
            .map(|f| format!("{}: {}", f.error_type, f.message))
            .unwrap_or_else(|| "no synthesis produced".to_string());

        let Some(opinion) = select_best_opinion(&rounds.independent).cloned() else {
            return Err(DomainError::Config("no R1 opinion to fall back to".to_string()).into());
        };

        let disclaimer = Disclaimer::chair_failure(chair, opinion.provider.as_str(), &detail);
        warn!("{}", disclaimer.message);
        self.scope.events.log(
            self.scope
                .event(CouncilEventKind::ChairFallback)
                .in_round(Round::Synthesis)
                .for_provider(chair)
                .with_fields(json!({
                    "chair": chair,
                    "fallback_provider": opinion.provider,
                    "detail": detail,
                })),
        );

        let confidence = opinion.confidence.capped_at(Confidence::Medium);
        Ok(self.complete(
            ReportBody::Degraded {
                disclaimer,
                opinion,
            },
            confidence,
            rounds,
            vec![],
        ))
    }

    fn short_circuit(
        mut self,
        decision: ShortCircuitDecision,
        opinion: CouncilOpinion,
        rounds: SettledRounds,
    ) -> Result<CouncilOutcome, RunCouncilError> {
        self.machine.transition(RunState::R3Settled)?;
        info!("Short-circuit: {}", decision.reason);
        self.scope.progress.on_short_circuit(&decision);
        self.scope.events.log(
            self.scope
                .event(CouncilEventKind::ShortCircuit)
                .with_fields(json!({
                    "reason": decision.reason,
                    "rounds_skipped": decision.rounds_skipped,
                    "confidence_cap": decision.confidence_adjustment.cap,
                })),
        );

        let confidence = decision.confidence_adjustment.apply(opinion.confidence);
        let skipped = decision.rounds_skipped.clone();
        Ok(self.complete(
            ReportBody::ShortCircuit { decision, opinion },
            confidence,
            rounds,
            skipped,
        ))
    }

    fn complete(
        self,
        body: ReportBody,
        confidence: Confidence,
        rounds: SettledRounds,
        rounds_skipped: Vec<Round>,
    ) -> CouncilOutcome {
        let metrics = RunMetrics::collect(&rounds, rounds_skipped, self.scope.elapsed_ms());
        let report = CouncilFinalReport {
            question: self.pack.question.clone(),
            body,
            confidence,
            rounds,
            metrics,
            state_history: self.machine.history().to_vec(),
        };

        info!(
            "Council complete in {}ms ({} calls, confidence {})",
            report.metrics.duration_ms,
            report.metrics.calls.len(),
            report.confidence
        );
        self.scope.events.log(
            self.scope
                .event(CouncilEventKind::RunCompleted)
                .with_fields(json!({
                    "degraded": report.is_degraded(),
                    "short_circuited": report.is_short_circuited(),
                    "confidence": report.confidence,
                    "source_provider": report.source_provider(),
                    "duration_ms": report.metrics.duration_ms,
                    "usage": report.metrics.usage,
                })),
        );
        CouncilOutcome::Completed(report)
    }

    fn abort_cancelled(self, rounds: SettledRounds) -> Result<CouncilOutcome, RunCouncilError> {
        let state = self.machine.current();
        self.abort(AbortReason::Cancelled { state }, rounds)
    }

    fn abort(
        mut self,
        reason: AbortReason,
        rounds: SettledRounds,
    ) -> Result<CouncilOutcome, RunCouncilError> {
        let state = self.machine.current();
        self.machine.transition(RunState::Aborted)?;
        warn!("Council run aborted: {}", reason);

        let metrics = RunMetrics::collect(&rounds, vec![], self.scope.elapsed_ms());
        self.scope.events.log(
            self.scope
                .event(CouncilEventKind::RunAborted)
                .with_fields(json!({
                    "reason": reason,
                    "state": state,
                    "duration_ms": metrics.duration_ms,
                })),
        );

        Ok(CouncilOutcome::Aborted(AbortedRun {
            question: self.pack.question.clone(),
            reason,
            state,
            rounds,
            metrics,
            state_history: self.machine.history().to_vec(),
        }))
    }
}
