//! R1: every participant answers the question on its own

use super::fanout::{FanOut, PlannedCall, RunScope, fan_out};
use super::request_options;
use council_domain::{
    ContextPack, CouncilConfig, CouncilOpinion, DomainError, OpinionLabels, ProviderAdapter, Round,
    RoundContext,
};
use std::collections::HashMap;
use std::sync::Arc;

pub(super) async fn run_independent(
    scope: &RunScope<'_>,
    participants: &[Arc<dyn ProviderAdapter>],
    pack: &ContextPack,
    config: &CouncilConfig,
) -> FanOut<CouncilOpinion> {
    let labels = OpinionLabels::default();
    let ctx = RoundContext::independent(pack, &labels);

    let calls = participants
        .iter()
        .map(|adapter| PlannedCall {
            provider: adapter.name().to_string(),
            prepared: adapter.build_request(&ctx, &request_options(config, adapter.name())),
        })
        .collect();

    let adapters: HashMap<&str, &Arc<dyn ProviderAdapter>> =
        participants.iter().map(|a| (a.name(), a)).collect();
    let deadline = config
        .timeouts
        .round_deadline(Round::Independent, participants.iter().map(|a| a.name()));

    fan_out(
        scope,
        Round::Independent,
        calls,
        config.retry,
        deadline,
        |provider, model, content| match adapters.get(provider) {
            Some(adapter) => adapter.parse_opinion(content, model),
            None => Err(DomainError::Config(format!("unknown provider '{}'", provider))),
        },
    )
    .await
}
