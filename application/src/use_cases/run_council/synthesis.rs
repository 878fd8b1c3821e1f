//! R3: the chair merges opinions and reviews into one synthesis

use super::fanout::{FanOut, PlannedCall, RunScope, fan_out};
use super::request_options;
use council_domain::{
    ChairSynthesis, ContextPack, CouncilConfig, CouncilOpinion, CouncilReview, OpinionLabels,
    ProviderAdapter, RetryPolicy, Round, RoundContext,
};
use std::sync::Arc;
use std::time::Duration;

pub(super) async fn run_synthesis(
    scope: &RunScope<'_>,
    chair: &Arc<dyn ProviderAdapter>,
    pack: &ContextPack,
    opinions: &[CouncilOpinion],
    reviews: &[CouncilReview],
    labels: &OpinionLabels,
    config: &CouncilConfig,
) -> FanOut<ChairSynthesis> {
    let ctx = RoundContext::synthesis(pack, opinions, reviews, labels);
    let call = PlannedCall {
        provider: chair.name().to_string(),
        prepared: chair.build_request(&ctx, &request_options(config, chair.name())),
    };

    let retry = chair_retry(config);
    let deadline = synthesis_deadline(config, chair.name(), &retry);

    fan_out(
        scope,
        Round::Synthesis,
        vec![call],
        retry,
        deadline,
        |_, model, content| chair.parse_synthesis(content, model),
    )
    .await
}

/// Chair retries only when R3 must come from the chair itself, and then
/// under the shared retry policy: a failed chair call is repeated once only
/// when its error is retryable (`rate_limit`, `network`, `timeout`). An
/// `auth` or `parse_error` failure gets a single call before the degraded
/// fallback.
fn chair_retry(config: &CouncilConfig) -> RetryPolicy {
    if config.quorum.r3_required {
        config.retry
    } else {
        RetryPolicy::none()
    }
}

/// Explicit R3 deadline, else room for every attempt plus the longest
/// possible backoff between them.
fn synthesis_deadline(config: &CouncilConfig, chair: &str, retry: &RetryPolicy) -> Duration {
    if let Some(ms) = config.timeouts.explicit_round_ms(Round::Synthesis) {
        return Duration::from_millis(ms);
    }
    let per_attempt = config.timeouts.provider_timeout_ms(chair);
    let per_backoff =
        retry.max_backoff_ms + (retry.max_backoff_ms as f64 * retry.jitter_ratio.max(0.0)).round() as u64;
    Duration::from_millis(
        per_attempt * u64::from(retry.max_attempts()) + per_backoff * u64::from(retry.max_retries),
    )
}
