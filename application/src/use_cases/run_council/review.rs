//! R2: providers that answered in R1 critique each other's opinions

use super::fanout::{FanOut, PlannedCall, RunScope, fan_out};
use super::request_options;
use council_domain::{
    ContextPack, CouncilConfig, CouncilOpinion, CouncilReview, DomainError, OpinionLabels,
    ProviderAdapter, Round, RoundContext,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Dispatch reviews from every `reviewer` that has at least one opinion to
/// critique. With self-review excluded in labeled mode, a reviewer whose
/// own opinion is the only one is left out of the round.
pub(super) async fn run_review(
    scope: &RunScope<'_>,
    reviewers: &[Arc<dyn ProviderAdapter>],
    pack: &ContextPack,
    opinions: &[CouncilOpinion],
    labels: &OpinionLabels,
    config: &CouncilConfig,
) -> FanOut<CouncilReview> {
    let hide_own = config.hides_own_opinion();

    let contexts: HashMap<&str, (&Arc<dyn ProviderAdapter>, RoundContext<'_>)> = reviewers
        .iter()
        .filter_map(|adapter| {
            let ctx = RoundContext::review(pack, opinions, labels, adapter.name(), hide_own);
            if ctx.opinions.is_empty() {
                debug!("{} has no opinions to review, not dispatched", adapter.name());
                return None;
            }
            Some((adapter.name(), (adapter, ctx)))
        })
        .collect();

    let calls = reviewers
        .iter()
        .filter_map(|adapter| contexts.get(adapter.name()))
        .map(|(adapter, ctx)| PlannedCall {
            provider: adapter.name().to_string(),
            prepared: adapter.build_request(ctx, &request_options(config, adapter.name())),
        })
        .collect();

    let deadline = config.timeouts.round_deadline(
        Round::CrossReview,
        reviewers
            .iter()
            .map(|a| a.name())
            .filter(|name| contexts.contains_key(name)),
    );

    fan_out(
        scope,
        Round::CrossReview,
        calls,
        config.retry,
        deadline,
        |provider, model, content| match contexts.get(provider) {
            Some((adapter, ctx)) => adapter.parse_review(content, model, ctx),
            None => Err(DomainError::Config(format!("unknown reviewer '{}'", provider))),
        },
    )
    .await
}
