//! Wiring from file configuration to a ready-to-run council
//!
//! [`CouncilBootstrap`] turns a loaded [`FileConfig`] into the provider
//! registry, the two concrete transports and the run configuration, and
//! hands out a [`RunCouncilUseCase`] built from them.

use crate::config::{ConfigLoader, ConfigValidationError, FileConfig, provider_catalog};
use crate::logging::JsonlEventLogger;
use crate::transport::{CommandTransport, ToolInvocationTransport};
use council_application::{AutoTransport, AvailabilityCache, RunCouncilUseCase, Transport};
use council_domain::{ConfigIssue, CouncilConfig, ProviderRegistry, StandardAdapter, Timeouts};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct CouncilBootstrap {
    pub registry: Arc<ProviderRegistry>,
    pub primary: Option<Arc<dyn Transport>>,
    pub secondary: Option<Arc<dyn Transport>>,
    pub config: CouncilConfig,
    /// Warnings left after validation
    pub issues: Vec<ConfigIssue>,
    pub event_log: Option<PathBuf>,
}

impl CouncilBootstrap {
    /// Load configuration from every source and build from it.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigValidationError> {
        let file = ConfigLoader::load(config_path)?;
        Self::from_file_config(&file)
    }

    /// Build from an already loaded file configuration. Fails when the
    /// configuration has any error-level issue.
    pub fn from_file_config(file: &FileConfig) -> Result<Self, ConfigValidationError> {
        let (config, issues) = file.checked()?;
        for issue in &issues {
            warn!("Config: {}", issue.message);
        }

        let (catalog, _) = provider_catalog(&file.providers);
        let mut registry = ProviderRegistry::new();
        for descriptor in catalog {
            debug!(
                "Registering provider {} ({})",
                descriptor.name, descriptor.default_model
            );
            registry.register(Arc::new(StandardAdapter::new(descriptor)));
        }

        let primary: Option<Arc<dyn Transport>> = file.transport.primary.settings().map(|s| {
            info!("Primary transport: {} (tool {})", s.command, s.tool);
            Arc::new(ToolInvocationTransport::new(s, availability(&config.timeouts)))
                as Arc<dyn Transport>
        });

        let commands = file.transport.secondary.commands.clone();
        let secondary: Option<Arc<dyn Transport>> = if commands.is_empty() {
            None
        } else {
            info!(
                "Secondary transport: commands for {}",
                commands.keys().cloned().collect::<Vec<_>>().join(", ")
            );
            Some(Arc::new(CommandTransport::new(
                commands,
                availability(&config.timeouts),
            )))
        };

        Ok(Self {
            registry: Arc::new(registry),
            primary,
            secondary,
            config,
            issues,
            event_log: file.council.event_log.clone(),
        })
    }

    /// Channel chooser honoring the configured preference
    pub fn transport(&self) -> AutoTransport {
        AutoTransport::new(self.primary.clone(), self.secondary.clone())
            .with_preference(self.config.transport_preference)
    }

    /// Use case over this registry and these transports, logging events
    /// to the configured JSONL file when one is set and can be opened.
    pub fn use_case(&self) -> RunCouncilUseCase {
        let use_case = RunCouncilUseCase::new(
            Arc::clone(&self.registry),
            self.primary.clone(),
            self.secondary.clone(),
        );
        let Some(path) = self.event_log.as_deref() else {
            return use_case;
        };
        match JsonlEventLogger::open(path) {
            Ok(logger) => {
                info!("Logging council events to {}", logger.path().display());
                use_case.with_event_logger(Arc::new(logger))
            }
            Err(e) => {
                warn!("Council event log {} unavailable: {}", path.display(), e);
                use_case
            }
        }
    }
}

/// Each transport checks on its own schedule, so each gets its own cache.
fn availability(timeouts: &Timeouts) -> AvailabilityCache {
    AvailabilityCache::new(timeouts.availability_ttl(), timeouts.availability_timeout())
}

#[cfg(test)]
mod tests {
    use super::*;
    use council_domain::{TransportKind, TransportPreference};

    #[test]
    fn test_defaults_wire_secondary_only() {
        let bootstrap = CouncilBootstrap::from_file_config(&FileConfig::default()).unwrap();

        assert_eq!(bootstrap.registry.names(), vec!["claude", "codex", "gemini"]);
        assert!(bootstrap.primary.is_none());
        assert_eq!(
            bootstrap.secondary.as_ref().map(|t| t.kind()),
            Some(TransportKind::Secondary)
        );
        assert_eq!(bootstrap.config, CouncilConfig::default());
        assert!(bootstrap.issues.is_empty());
        assert_eq!(bootstrap.transport().preference(), TransportPreference::Auto);
    }

    #[test]
    fn test_provider_sections_reach_registry() {
        let file: FileConfig = toml::from_str(
            r#"
[council]
participants = ["claude", "local"]
chair = "claude"

[transport]
preference = "primary"

[transport.primary]
command = "council-mcp"

[providers.local]
model = "llama-3.3-70b"
chair_eligible = false
"#,
        )
        .unwrap();

        let bootstrap = CouncilBootstrap::from_file_config(&file).unwrap();
        assert!(bootstrap.registry.contains("local"));
        assert_eq!(
            bootstrap.registry.resolve_model("local", None).as_deref(),
            Some("llama-3.3-70b")
        );
        assert_eq!(
            bootstrap.primary.as_ref().map(|t| t.kind()),
            Some(TransportKind::Primary)
        );
        assert_eq!(
            bootstrap.transport().preference(),
            TransportPreference::Primary
        );
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut file = FileConfig::default();
        file.council.participants = vec![];
        assert!(matches!(
            CouncilBootstrap::from_file_config(&file),
            Err(ConfigValidationError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_use_case_writes_event_log() {
        use council_application::RunCouncilInput;
        use council_domain::ContextPack;
        use tokio_util::sync::CancellationToken;

        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("events.jsonl");
        let mut file = FileConfig::default();
        file.council.event_log = Some(log.clone());

        let bootstrap = CouncilBootstrap::from_file_config(&file).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let input = RunCouncilInput::new(
            ContextPack::new("Which cache eviction policy?"),
            bootstrap.config.clone(),
        );
        let outcome = bootstrap.use_case().execute(input, cancel).await.unwrap();
        assert!(outcome.aborted().is_some());

        let contents = std::fs::read_to_string(&log).unwrap();
        let last: serde_json::Value =
            serde_json::from_str(contents.lines().last().unwrap()).unwrap();
        assert_eq!(last["type"], "run_aborted");
        assert!(last["elapsed_ms"].is_u64());
    }
}
