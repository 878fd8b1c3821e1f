//! Built-in provider descriptors

use super::capabilities::{ProviderCapabilities, ProviderDescriptor};

pub fn claude() -> ProviderDescriptor {
    ProviderDescriptor::new("claude", "claude-sonnet-4.5")
        .with_models(&["claude-opus-4.5", "claude-haiku-4.5", "claude-sonnet-4"])
        .with_capabilities(ProviderCapabilities {
            max_context_tokens: 200_000,
            max_output_tokens: 8_192,
            supports_system_message: true,
            supports_streaming: true,
            supports_function_calling: true,
        })
}

pub fn codex() -> ProviderDescriptor {
    ProviderDescriptor::new("codex", "gpt-5.2-codex")
        .with_models(&["gpt-5.1-codex", "gpt-5.1-codex-mini", "gpt-5.2"])
        .with_capabilities(ProviderCapabilities {
            max_context_tokens: 272_000,
            max_output_tokens: 16_384,
            supports_system_message: true,
            supports_streaming: true,
            supports_function_calling: true,
        })
}

pub fn gemini() -> ProviderDescriptor {
    ProviderDescriptor::new("gemini", "gemini-3-pro-preview")
        .with_models(&["gemini-2.5-pro", "gemini-2.5-flash"])
        .with_capabilities(ProviderCapabilities {
            max_context_tokens: 1_000_000,
            max_output_tokens: 8_192,
            supports_system_message: false,
            supports_streaming: true,
            supports_function_calling: true,
        })
}

/// Descriptors for every built-in provider, by name
pub fn all() -> Vec<ProviderDescriptor> {
    vec![claude(), codex(), gemini()]
}

/// Built-in descriptor by name
pub fn by_name(name: &str) -> Option<ProviderDescriptor> {
    all().into_iter().find(|d| d.name == name)
}
