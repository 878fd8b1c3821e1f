//! Provider registry
//!
//! Built once at startup, then shared read-only (behind an `Arc`) by every
//! run. Lookups never mutate, so no locking is needed.

use super::adapter::{ProviderAdapter, StandardAdapter};
use super::builtin;
use crate::config::{ConfigIssue, ConfigIssueCode, CouncilConfig};
use crate::core::error::DomainError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in providers
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for descriptor in builtin::all() {
            registry.register(Arc::new(StandardAdapter::new(descriptor)));
        }
        registry
    }

    /// Insert or replace the adapter registered under the adapter's name.
    /// Returns the adapter it replaced.
    pub fn register(
        &mut self,
        adapter: Arc<dyn ProviderAdapter>,
    ) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.insert(adapter.name().to_string(), adapter)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ProviderAdapter>> {
        self.adapters.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.adapters.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Model a provider would use for `requested`, or `None` if the
    /// provider is not registered.
    pub fn resolve_model(&self, name: &str, requested: Option<&str>) -> Option<String> {
        self.get(name).map(|a| a.resolve_model(requested))
    }

    /// Configured participants that are registered, in configured order.
    ///
    /// Unregistered and repeated names are dropped and reported as issues.
    pub fn participants(
        &self,
        config: &CouncilConfig,
    ) -> (Vec<Arc<dyn ProviderAdapter>>, Vec<ConfigIssue>) {
        let mut adapters = Vec::new();
        let mut issues = Vec::new();
        let mut seen = HashSet::new();

        for name in &config.participants {
            if !seen.insert(name.as_str()) {
                issues.push(ConfigIssue::warning(
                    ConfigIssueCode::DuplicateProvider { name: name.clone() },
                    format!("participants: '{}' listed more than once, ignoring repeat", name),
                ));
                continue;
            }
            match self.get(name) {
                Some(adapter) => adapters.push(Arc::clone(adapter)),
                None => issues.push(ConfigIssue::warning(
                    ConfigIssueCode::UnknownProvider { name: name.clone() },
                    format!("participants: '{}' is not a registered provider, skipping", name),
                )),
            }
        }

        (adapters, issues)
    }

    /// Resolve the chair.
    ///
    /// Uses the configured chair when it is registered and chair-eligible.
    /// Otherwise falls back to the first eligible configured participant,
    /// then to the first eligible registered provider by name. Fails when no
    /// eligible provider exists at all.
    pub fn chair(
        &self,
        config: &CouncilConfig,
    ) -> Result<(Arc<dyn ProviderAdapter>, Vec<ConfigIssue>), DomainError> {
        let mut issues = Vec::new();

        if let Some(name) = &config.chair {
            match self.get(name) {
                Some(adapter) if adapter.chair_eligible() => {
                    return Ok((Arc::clone(adapter), issues));
                }
                Some(_) => issues.push(ConfigIssue::warning(
                    ConfigIssueCode::ChairNotEligible { name: name.clone() },
                    format!("chair: '{}' is not chair-eligible, choosing another", name),
                )),
                None => issues.push(ConfigIssue::warning(
                    ConfigIssueCode::UnknownProvider { name: name.clone() },
                    format!("chair: '{}' is not a registered provider, choosing another", name),
                )),
            }
        }

        let from_participants = config
            .participants
            .iter()
            .filter_map(|name| self.get(name))
            .find(|a| a.chair_eligible());
        let fallback = from_participants.or_else(|| {
            self.names()
                .into_iter()
                .filter_map(|name| self.get(name))
                .find(|a| a.chair_eligible())
        });

        match fallback {
            Some(adapter) => Ok((Arc::clone(adapter), issues)),
            None => Err(DomainError::Config(
                "no chair-eligible provider is registered".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::capabilities::ProviderDescriptor;

    fn adapter(name: &str, chair_eligible: bool) -> Arc<dyn ProviderAdapter> {
        Arc::new(StandardAdapter::new(
            ProviderDescriptor::new(name, format!("{}-1", name)).with_chair_eligible(chair_eligible),
        ))
    }

    #[test]
    fn test_register_is_upsert() {
        let mut registry = ProviderRegistry::new();
        assert!(registry.register(adapter("claude", true)).is_none());
        let replaced = registry.register(adapter("claude", false));
        assert!(replaced.is_some());
        assert_eq!(registry.len(), 1);
        assert!(!registry.get("claude").unwrap().chair_eligible());
    }

    #[test]
    fn test_get_miss_is_none() {
        let registry = ProviderRegistry::with_builtins();
        assert!(registry.get("grok").is_none());
        assert_eq!(registry.names(), vec!["claude", "codex", "gemini"]);
    }

    #[test]
    fn test_participants_drop_unknown_with_warning() {
        let registry = ProviderRegistry::with_builtins();
        let config = CouncilConfig::new(vec![
            "gemini".to_string(),
            "grok".to_string(),
            "claude".to_string(),
            "gemini".to_string(),
        ]);
        let (participants, issues) = registry.participants(&config);
        let names: Vec<_> = participants.iter().map(|a| a.name().to_string()).collect();
        assert_eq!(names, vec!["gemini", "claude"]);
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().any(|i| matches!(&i.code, ConfigIssueCode::UnknownProvider { name } if name == "grok")));
        assert!(issues.iter().all(|i| !i.is_error()));
    }

    #[test]
    fn test_chair_configured() {
        let registry = ProviderRegistry::with_builtins();
        let config = CouncilConfig::default().with_chair("gemini");
        let (chair, issues) = registry.chair(&config).unwrap();
        assert_eq!(chair.name(), "gemini");
        assert!(issues.is_empty());
    }

    #[test]
    fn test_chair_falls_back_when_ineligible() {
        let mut registry = ProviderRegistry::new();
        registry.register(adapter("alpha", false));
        registry.register(adapter("beta", true));
        registry.register(adapter("gamma", true));
        let config = CouncilConfig::new(vec!["alpha".to_string(), "gamma".to_string()])
            .with_chair("alpha");
        let (chair, issues) = registry.chair(&config).unwrap();
        assert_eq!(chair.name(), "gamma");
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_chair_outside_participants() {
        let mut registry = ProviderRegistry::new();
        registry.register(adapter("alpha", false));
        registry.register(adapter("zeta", true));
        registry.register(adapter("beta", true));
        let config = CouncilConfig::new(vec!["alpha".to_string()]);
        let (chair, _) = registry.chair(&config).unwrap();
        assert_eq!(chair.name(), "beta");
    }

    #[test]
    fn test_no_eligible_chair_is_config_error() {
        let mut registry = ProviderRegistry::new();
        registry.register(adapter("alpha", false));
        let config = CouncilConfig::new(vec!["alpha".to_string()]).with_chair("missing");
        let Err(err) = registry.chair(&config) else {
            panic!("expected no eligible chair");
        };
        assert!(matches!(err, DomainError::Config(_)));
    }

    #[test]
    fn test_resolve_model() {
        let registry = ProviderRegistry::with_builtins();
        assert_eq!(
            registry.resolve_model("claude", Some("claude-opus-4.5")).as_deref(),
            Some("claude-opus-4.5")
        );
        assert_eq!(registry.resolve_model("grok", None), None);
    }
}
