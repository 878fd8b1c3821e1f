//! Retry and backoff policy
//!
//! Retry state is per request: the executor keeps its own attempt counter
//! for every provider call and never shares it across providers or rounds.

use crate::core::round::Round;
use crate::transport::TransportResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do with a provider whose call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryAction {
    /// Wait and send the request again
    Retry { delay_ms: u64 },
    /// Record the failure and let the round continue without the provider
    SkipProvider,
    /// Chair call exhausted: use the best R1 opinion instead
    FallbackToBestR1,
    /// Not enough other providers remain for the round to be useful
    FailRound,
}

/// Retry budget and exponential backoff with bounded jitter
///
/// Delay for retry `n` (0-based) is `min(initial * multiplier^n, max)`
/// plus up to `jitter_ratio` of that value. Jitter only ever adds, so the
/// first retry never waits less than `initial_backoff_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: f64,
    pub max_backoff_ms: u64,
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_backoff_ms: 1000,
            multiplier: 2.0,
            max_backoff_ms: 10_000,
            jitter_ratio: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Whether `result` should be retried after `retries_done` retries.
    pub fn should_retry(&self, result: &TransportResult, retries_done: u32) -> bool {
        !result.is_ok() && result.is_retryable() && retries_done < self.max_retries
    }

    /// Backoff before retry number `retry_index` (0-based) for a given jitter
    /// sample in `0.0..=1.0`.
    pub fn backoff_with_jitter(&self, retry_index: u32, jitter_sample: f64) -> Duration {
        let base = self.initial_backoff_ms as f64 * self.multiplier.powi(retry_index as i32);
        let capped = base.min(self.max_backoff_ms as f64);
        let jitter = capped * self.jitter_ratio.max(0.0) * jitter_sample.clamp(0.0, 1.0);
        Duration::from_millis((capped + jitter).round() as u64)
    }

    /// Backoff with a random jitter sample
    pub fn backoff(&self, retry_index: u32) -> Duration {
        self.backoff_with_jitter(retry_index, rand::random::<f64>())
    }

    /// Delay before the next attempt, honoring a provider `retry_after_ms`
    /// hint up to the backoff cap.
    pub fn delay_for(&self, retry_index: u32, retry_after_ms: Option<u64>) -> Duration {
        let backoff = self.backoff(retry_index);
        match retry_after_ms {
            Some(hint) => backoff.max(Duration::from_millis(hint.min(self.max_backoff_ms))),
            None => backoff,
        }
    }

    /// Decide what follows a failed attempt.
    ///
    /// `others_remaining` counts the other providers in the round that have
    /// not failed (still running or already succeeded).
    pub fn next_action(
        &self,
        round: Round,
        result: &TransportResult,
        retries_done: u32,
        others_remaining: usize,
    ) -> RetryAction {
        if self.should_retry(result, retries_done) {
            let hint = result.error.as_ref().and_then(|e| e.retry_after_ms);
            return RetryAction::Retry {
                delay_ms: self.delay_for(retries_done, hint).as_millis() as u64,
            };
        }
        Self::after_exhaustion(round, others_remaining)
    }

    /// Action once the retry budget is spent (or the error is not retryable).
    pub fn after_exhaustion(round: Round, others_remaining: usize) -> RetryAction {
        match round {
            Round::Synthesis => RetryAction::FallbackToBestR1,
            Round::Independent | Round::CrossReview if others_remaining >= 2 => {
                RetryAction::SkipProvider
            }
            _ => RetryAction::FailRound,
        }
    }

    /// Total attempts allowed per request
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}
