//! Run state machine
//!
//! ```text
//! R1_PENDING → R1_SETTLED → R2_PENDING → R2_SETTLED → R3_PENDING → R3_SETTLED
//!      │            │  │ └────────────────────┐  │  └───────────┐
//!      │            │  └── short-circuit ───► R3_PENDING      short-circuit ─► R3_SETTLED
//!      │            └───── short-circuit ──────────────────────────────────► R3_SETTLED
//!      └──────────── any non-terminal state ───────────────────────────────► ABORTED
//! ```

use crate::core::error::DomainError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    R1Pending,
    R1Settled,
    R2Pending,
    R2Settled,
    R3Pending,
    R3Settled,
    Aborted,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::R1Pending => "R1_PENDING",
            RunState::R1Settled => "R1_SETTLED",
            RunState::R2Pending => "R2_PENDING",
            RunState::R2Settled => "R2_SETTLED",
            RunState::R3Pending => "R3_PENDING",
            RunState::R3Settled => "R3_SETTLED",
            RunState::Aborted => "ABORTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::R3Settled | RunState::Aborted)
    }

    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;

        if next == Aborted {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (R1Pending, R1Settled)
                | (R1Settled, R2Pending)
                | (R1Settled, R3Pending)
                | (R1Settled, R3Settled)
                | (R2Pending, R2Settled)
                | (R2Settled, R3Pending)
                | (R2Settled, R3Settled)
                | (R3Pending, R3Settled)
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tracks the current state of a run and every state it passed through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStateMachine {
    current: RunState,
    history: Vec<RunState>,
}

impl Default for RunStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStateMachine {
    pub fn new() -> Self {
        Self {
            current: RunState::R1Pending,
            history: vec![RunState::R1Pending],
        }
    }

    pub fn current(&self) -> RunState {
        self.current
    }

    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    pub fn transition(&mut self, next: RunState) -> Result<(), DomainError> {
        if !self.current.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.current.to_string(),
                to: next.to_string(),
            });
        }
        self.current = next;
        self.history.push(next);
        Ok(())
    }

    /// Whether the run ever entered `state`
    pub fn visited(&self, state: RunState) -> bool {
        self.history.contains(&state)
    }
}
