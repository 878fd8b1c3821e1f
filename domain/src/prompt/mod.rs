//! Prompt building
//!
//! A [`PromptBuilder`] turns a round context into prioritized prompt
//! sections. It is a pure function; adapters apply their context-window
//! budget to the result with [`BuiltPrompt::fit`].

mod budget;
mod template;

pub use budget::{BuiltPrompt, PromptMetadata, PromptSection, SectionKind, estimate_tokens};
pub use template::DefaultPromptBuilder;

use crate::council::context::RoundContext;

pub trait PromptBuilder: Send + Sync {
    fn build(&self, ctx: &RoundContext<'_>) -> BuiltPrompt;
}
