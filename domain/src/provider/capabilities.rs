//! Provider descriptors

use serde::{Deserialize, Serialize};

/// What a provider's models can accept and produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderCapabilities {
    pub max_context_tokens: u32,
    pub max_output_tokens: u32,
    pub supports_system_message: bool,
    pub supports_streaming: bool,
    pub supports_function_calling: bool,
}

impl Default for ProviderCapabilities {
    fn default() -> Self {
        Self {
            max_context_tokens: 128_000,
            max_output_tokens: 8_192,
            supports_system_message: true,
            supports_streaming: false,
            supports_function_calling: false,
        }
    }
}

/// Identity, models and capabilities of a provider. Immutable once
/// registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub name: String,
    pub default_model: String,
    /// Models accepted by `resolve_model`; the default model is always one
    #[serde(default)]
    pub supported_models: Vec<String>,
    #[serde(default)]
    pub capabilities: ProviderCapabilities,
    #[serde(default = "default_chair_eligible")]
    pub chair_eligible: bool,
}

fn default_chair_eligible() -> bool {
    true
}

impl ProviderDescriptor {
    pub fn new(name: impl Into<String>, default_model: impl Into<String>) -> Self {
        let default_model = default_model.into();
        Self {
            name: name.into(),
            supported_models: vec![default_model.clone()],
            default_model,
            capabilities: ProviderCapabilities::default(),
            chair_eligible: true,
        }
    }

    pub fn with_models(mut self, models: &[&str]) -> Self {
        for model in models {
            if !self.supported_models.iter().any(|m| m == model) {
                self.supported_models.push(model.to_string());
            }
        }
        self
    }

    pub fn with_capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_chair_eligible(mut self, eligible: bool) -> Self {
        self.chair_eligible = eligible;
        self
    }

    pub fn supports_model(&self, model: &str) -> bool {
        self.supported_models.iter().any(|m| m == model)
    }
}
