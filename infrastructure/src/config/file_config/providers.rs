//! Provider catalog overrides from TOML (`[providers.<name>]` sections)
//!
//! Built-in providers (`claude`, `codex`, `gemini`) can be adjusted, and new
//! providers declared, without code changes:
//!
//! ```toml
//! [providers.claude]
//! model = "claude-opus-4.5"
//!
//! [providers.local]
//! model = "llama-3.3-70b"
//! chair_eligible = false
//! max_context_tokens = 32000
//! supports_system_message = false
//! ```

use council_domain::provider::builtin;
use council_domain::{ConfigIssue, ConfigIssueCode, ProviderDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileProviderConfig {
    /// Default model; required for providers that are not built in
    pub model: Option<String>,
    /// Additional accepted models
    pub models: Vec<String>,
    pub chair_eligible: Option<bool>,
    pub max_context_tokens: Option<u32>,
    pub max_output_tokens: Option<u32>,
    pub supports_system_message: Option<bool>,
}

impl FileProviderConfig {
    /// Descriptor for `name`: the built-in one with this section's
    /// overrides, or a new one when the section names a model.
    pub fn descriptor(&self, name: &str) -> (Option<ProviderDescriptor>, Vec<ConfigIssue>) {
        let mut issues = Vec::new();

        if let Some(model) = &self.model
            && model.trim().is_empty()
        {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::EmptyName {
                    field: format!("providers.{}.model", name),
                },
                format!("providers.{}.model: model name cannot be empty", name),
            ));
            return (None, issues);
        }

        let base = match (builtin::by_name(name), &self.model) {
            (Some(mut builtin), Some(model)) => {
                builtin.default_model = model.clone();
                if !builtin.supports_model(model) {
                    builtin.supported_models.push(model.clone());
                }
                builtin
            }
            (Some(builtin), None) => builtin,
            (None, Some(model)) => ProviderDescriptor::new(name, model.clone()),
            (None, None) => {
                issues.push(ConfigIssue::error(
                    ConfigIssueCode::InvalidConstraint {
                        field: format!("providers.{}.model", name),
                        reason: "required for a provider that is not built in".to_string(),
                    },
                    format!(
                        "providers.{}: unknown provider needs a `model`",
                        name
                    ),
                ));
                return (None, issues);
            }
        };

        let extra: Vec<&str> = self.models.iter().map(String::as_str).collect();
        let mut descriptor = base.with_models(&extra);
        if let Some(eligible) = self.chair_eligible {
            descriptor.chair_eligible = eligible;
        }
        if let Some(tokens) = self.max_context_tokens {
            descriptor.capabilities.max_context_tokens = tokens;
        }
        if let Some(tokens) = self.max_output_tokens {
            descriptor.capabilities.max_output_tokens = tokens;
        }
        if let Some(supports) = self.supports_system_message {
            descriptor.capabilities.supports_system_message = supports;
        }

        for (field, value) in [
            ("max_context_tokens", descriptor.capabilities.max_context_tokens),
            ("max_output_tokens", descriptor.capabilities.max_output_tokens),
        ] {
            if value == 0 {
                issues.push(ConfigIssue::error(
                    ConfigIssueCode::InvalidConstraint {
                        field: format!("providers.{}.{}", name, field),
                        reason: "zero".to_string(),
                    },
                    format!("providers.{}.{} must be greater than 0", name, field),
                ));
            }
        }

        (Some(descriptor), issues)
    }
}

/// Provider sections keyed by provider name
pub type FileProvidersConfig = BTreeMap<String, FileProviderConfig>;

/// Built-in descriptors with overrides applied, plus declared providers.
/// Invalid sections are reported and left out.
pub fn provider_catalog(
    providers: &FileProvidersConfig,
) -> (Vec<ProviderDescriptor>, Vec<ConfigIssue>) {
    let mut issues = Vec::new();
    let mut catalog: BTreeMap<String, ProviderDescriptor> = builtin::all()
        .into_iter()
        .map(|d| (d.name.clone(), d))
        .collect();

    for (name, section) in providers {
        if name.trim().is_empty() {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::EmptyName {
                    field: "providers".to_string(),
                },
                "providers: provider name cannot be empty",
            ));
            continue;
        }
        let (descriptor, section_issues) = section.descriptor(name);
        issues.extend(section_issues);
        if let Some(descriptor) = descriptor {
            catalog.insert(name.clone(), descriptor);
        }
    }

    (catalog.into_values().collect(), issues)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_defaults_to_builtins() {
        let (catalog, issues) = provider_catalog(&FileProvidersConfig::new());
        assert!(issues.is_empty());
        let names: Vec<&str> = catalog.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["claude", "codex", "gemini"]);
    }

    #[test]
    fn test_override_builtin_model() {
        let providers: FileProvidersConfig = toml::from_str(
            r#"
[claude]
model = "claude-opus-4.5"
chair_eligible = false
"#,
        )
        .unwrap();
        let (catalog, issues) = provider_catalog(&providers);
        assert!(issues.is_empty());

        let claude = catalog.iter().find(|d| d.name == "claude").unwrap();
        assert_eq!(claude.default_model, "claude-opus-4.5");
        assert!(!claude.chair_eligible);
        // Built-in capabilities survive the override
        assert_eq!(claude.capabilities.max_context_tokens, 200_000);
    }

    #[test]
    fn test_declare_new_provider() {
        let section = FileProviderConfig {
            model: Some("llama-3.3-70b".to_string()),
            supports_system_message: Some(false),
            max_context_tokens: Some(32_000),
            ..Default::default()
        };
        let (descriptor, issues) = section.descriptor("local");
        assert!(issues.is_empty());
        let descriptor = descriptor.unwrap();
        assert_eq!(descriptor.name, "local");
        assert!(!descriptor.capabilities.supports_system_message);
        assert_eq!(descriptor.capabilities.max_context_tokens, 32_000);
    }

    #[test]
    fn test_unknown_provider_without_model() {
        let (descriptor, issues) = FileProviderConfig::default().descriptor("local");
        assert!(descriptor.is_none());
        assert!(issues[0].is_error());
    }

    #[test]
    fn test_empty_model_and_zero_tokens() {
        let section = FileProviderConfig {
            model: Some("  ".to_string()),
            ..Default::default()
        };
        let (descriptor, issues) = section.descriptor("claude");
        assert!(descriptor.is_none());
        assert!(matches!(issues[0].code, ConfigIssueCode::EmptyName { .. }));

        let section = FileProviderConfig {
            max_output_tokens: Some(0),
            ..Default::default()
        };
        let (descriptor, issues) = section.descriptor("claude");
        assert!(descriptor.is_some());
        assert_eq!(issues.len(), 1);
    }
}
