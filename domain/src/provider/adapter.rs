//! Provider adapters
//!
//! An adapter turns a round context into a provider-specific request and
//! the provider's raw answer back into the round's schema. It never
//! performs I/O: requests go out through a transport.

use super::capabilities::{ProviderCapabilities, ProviderDescriptor};
use crate::core::error::DomainError;
use crate::council::context::RoundContext;
use crate::council::entities::{ChairSynthesis, CouncilOpinion, CouncilReview};
use crate::council::parsing;
use crate::prompt::{DefaultPromptBuilder, PromptBuilder, PromptMetadata};
use crate::transport::{Message, Payload, TransportRequest};
use std::sync::Arc;

/// Per-call request settings from the run configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub model: Option<String>,
    pub temperature: f32,
    /// Run-level cap, applied below the provider's own limit
    pub max_output_tokens: Option<u32>,
    pub timeout_ms: u64,
}

/// A request ready for a transport, with what happened to its prompt
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub request: TransportRequest,
    pub metadata: PromptMetadata,
}

pub trait ProviderAdapter: Send + Sync {
    fn descriptor(&self) -> &ProviderDescriptor;

    fn prompt_builder(&self) -> &dyn PromptBuilder;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.descriptor().capabilities
    }

    fn chair_eligible(&self) -> bool {
        self.descriptor().chair_eligible
    }

    /// The requested model if this provider supports it, else the default.
    fn resolve_model(&self, requested: Option<&str>) -> String {
        let descriptor = self.descriptor();
        match requested {
            Some(model) if descriptor.supports_model(model) => model.to_string(),
            _ => descriptor.default_model.clone(),
        }
    }

    /// Build the request for one provider call.
    ///
    /// The prompt is cut to fit `max_context_tokens` minus the reserved
    /// output tokens; anything cut is listed in the returned metadata.
    /// Without system-message support the system text is folded into the
    /// user message.
    fn build_request(&self, ctx: &RoundContext<'_>, options: &RequestOptions) -> PreparedRequest {
        let caps = self.capabilities();
        let max_tokens = caps
            .max_output_tokens
            .min(options.max_output_tokens.unwrap_or(u32::MAX));
        let budget = caps.max_context_tokens.saturating_sub(max_tokens) as usize;

        let (prompt, metadata) = self.prompt_builder().build(ctx).fit(budget);
        let user = prompt.render_user();

        let (system, messages) = if caps.supports_system_message {
            (Some(prompt.system), vec![Message::user(user)])
        } else {
            (None, vec![Message::user(format!("{}\n\n{}", prompt.system, user))])
        };

        PreparedRequest {
            request: TransportRequest {
                provider: self.name().to_string(),
                model: self.resolve_model(options.model.as_deref()),
                payload: Payload {
                    system,
                    messages,
                    max_tokens,
                    temperature: options.temperature,
                },
                timeout_ms: options.timeout_ms,
            },
            metadata,
        }
    }

    fn parse_opinion(&self, content: &str, model: &str) -> Result<CouncilOpinion, DomainError> {
        parsing::parse_opinion(content, self.name(), model)
    }

    fn parse_review(
        &self,
        content: &str,
        model: &str,
        ctx: &RoundContext<'_>,
    ) -> Result<CouncilReview, DomainError> {
        let reviewable: Vec<&str> = ctx.reviewable_providers().collect();
        parsing::parse_review(content, self.name(), model, ctx.labels, &reviewable)
    }

    fn parse_synthesis(&self, content: &str, model: &str) -> Result<ChairSynthesis, DomainError> {
        parsing::parse_synthesis(content, self.name(), model)
    }
}

/// Adapter driven entirely by its descriptor
#[derive(Clone)]
pub struct StandardAdapter {
    descriptor: ProviderDescriptor,
    prompt_builder: Arc<dyn PromptBuilder>,
}

impl StandardAdapter {
    pub fn new(descriptor: ProviderDescriptor) -> Self {
        Self {
            descriptor,
            prompt_builder: Arc::new(DefaultPromptBuilder),
        }
    }

    pub fn with_prompt_builder(mut self, builder: Arc<dyn PromptBuilder>) -> Self {
        self.prompt_builder = builder;
        self
    }
}

impl std::fmt::Debug for StandardAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardAdapter")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl ProviderAdapter for StandardAdapter {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn prompt_builder(&self) -> &dyn PromptBuilder {
        self.prompt_builder.as_ref()
    }
}
