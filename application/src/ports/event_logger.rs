//! Port for structured council event logging.
//!
//! Defines the [`CouncilEventLogger`] trait for recording run events
//! (round boundaries, provider calls, failures, short-circuits, fallbacks)
//! to a structured audit log.
//!
//! This is separate from `tracing`-based operation logs: tracing handles
//! human-readable diagnostic messages, while this port captures the run's
//! history in a machine-readable form. Every event carries its offset from
//! the start of the run and, where it concerns one, the round and provider,
//! so a sink can correlate calls without parsing the free-form fields.

use council_domain::Round;
use serde_json::{Map, Value};
use std::fmt;

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouncilEventKind {
    RunStarted,
    RoundStarted,
    ProviderCall,
    ProviderFailed,
    RoundSettled,
    ShortCircuit,
    ChairFallback,
    RunAborted,
    RunCompleted,
}

impl CouncilEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CouncilEventKind::RunStarted => "run_started",
            CouncilEventKind::RoundStarted => "round_started",
            CouncilEventKind::ProviderCall => "provider_call",
            CouncilEventKind::ProviderFailed => "provider_failed",
            CouncilEventKind::RoundSettled => "round_settled",
            CouncilEventKind::ShortCircuit => "short_circuit",
            CouncilEventKind::ChairFallback => "chair_fallback",
            CouncilEventKind::RunAborted => "run_aborted",
            CouncilEventKind::RunCompleted => "run_completed",
        }
    }

    /// Last event of a run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CouncilEventKind::RunAborted | CouncilEventKind::RunCompleted
        )
    }
}

impl fmt::Display for CouncilEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured council event. The sink adds the wall-clock timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct CouncilEvent {
    pub kind: CouncilEventKind,
    /// Milliseconds since the run started
    pub elapsed_ms: u64,
    pub round: Option<Round>,
    pub provider: Option<String>,
    /// Event-specific data
    pub fields: Map<String, Value>,
}

impl CouncilEvent {
    pub fn new(kind: CouncilEventKind, elapsed_ms: u64) -> Self {
        Self {
            kind,
            elapsed_ms,
            round: None,
            provider: None,
            fields: Map::new(),
        }
    }

    pub fn in_round(mut self, round: Round) -> Self {
        self.round = Some(round);
        self
    }

    pub fn for_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Add the entries of a JSON object. Anything else lands under `data`.
    pub fn with_fields(mut self, fields: Value) -> Self {
        match fields {
            Value::Object(map) => self.fields.extend(map),
            Value::Null => {}
            other => {
                self.fields.insert("data".to_string(), other);
            }
        }
        self
    }
}

/// Port for logging council events to a structured log.
///
/// The `log` method is synchronous and non-fallible so that logging never
/// disrupts a run; sinks swallow their own write failures.
pub trait CouncilEventLogger: Send + Sync {
    fn log(&self, event: CouncilEvent);
}

/// No-op implementation for tests and when logging is disabled.
pub struct NoEventLogger;

impl CouncilEventLogger for NoEventLogger {
    fn log(&self, _event: CouncilEvent) {}
}
