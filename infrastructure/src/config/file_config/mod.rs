//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! They are deserialized directly and use domain types where the domain
//! type already has the right shape (`[quorum]`, `[timeouts]`, `[retry]`).

mod council;
mod providers;
mod transport;

pub use council::FileCouncilConfig;
pub use providers::{FileProviderConfig, FileProvidersConfig, provider_catalog};
pub use transport::{
    FilePrimaryTransportConfig, FileSecondaryTransportConfig, FileTransportConfig,
};

use council_domain::{
    ConfigIssue, ConfigIssueCode, CouncilConfig, QuorumPolicy, RetryPolicy, Timeouts,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Configuration that could not be loaded or is unusable
#[derive(Debug, Error)]
pub enum ConfigValidationError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid configuration: {}", describe(.0))]
    Invalid(Vec<ConfigIssue>),
}

fn describe(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(|i| i.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Participants, chair and run behavior
    pub council: FileCouncilConfig,
    /// Minimum successes per round
    pub quorum: QuorumPolicy,
    /// Round deadlines, provider timeouts, availability timing
    pub timeouts: Timeouts,
    /// Retry budget and backoff
    pub retry: RetryPolicy,
    /// Channel selection, tool server and CLI commands
    pub transport: FileTransportConfig,
    /// Provider catalog overrides
    pub providers: FileProvidersConfig,
}

impl FileConfig {
    /// Run configuration described by this file, with the issues found
    /// while converting enum-valued strings.
    pub fn to_council_config(&self) -> (CouncilConfig, Vec<ConfigIssue>) {
        let mut config = CouncilConfig {
            quorum: self.quorum,
            timeouts: self.timeouts.clone(),
            retry: self.retry,
            ..Default::default()
        };
        let mut issues = self.council.apply(&mut config);

        let (preference, preference_issues) = self.transport.parse_preference();
        config.transport_preference = preference;
        issues.extend(preference_issues);

        (config, issues)
    }

    /// Validate the entire configuration, returning all detected issues.
    ///
    /// This is the single entry point for config validation. It checks:
    /// 1. Enum-valued strings (`short_circuit`, `review_mode`, `preference`)
    /// 2. Run options: names, quorum minimums, retry bounds, timeouts
    /// 3. Provider sections and participants missing from the catalog
    /// 4. Transport reachability of every participant
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let (config, mut issues) = self.to_council_config();
        issues.extend(config.validate());

        let (catalog, catalog_issues) = provider_catalog(&self.providers);
        issues.extend(catalog_issues);
        let known: HashSet<&str> = catalog.iter().map(|d| d.name.as_str()).collect();
        for name in &config.participants {
            if !name.trim().is_empty() && !known.contains(name.as_str()) {
                issues.push(ConfigIssue::warning(
                    ConfigIssueCode::UnknownProvider { name: name.clone() },
                    format!(
                        "council.participants: '{}' has no [providers.{}] section and is not built in",
                        name, name
                    ),
                ));
            }
        }

        issues.extend(self.transport.validate(&config.participants));
        issues
    }

    /// Validated run configuration: `Err` when any issue is an error,
    /// otherwise the configuration and its warnings.
    pub fn checked(&self) -> Result<(CouncilConfig, Vec<ConfigIssue>), ConfigValidationError> {
        let issues = self.validate();
        if issues.iter().any(ConfigIssue::is_error) {
            return Err(ConfigValidationError::Invalid(
                issues.into_iter().filter(ConfigIssue::is_error).collect(),
            ));
        }
        let (config, _) = self.to_council_config();
        Ok((config, issues))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use council_domain::{ReviewMode, Severity, TransportPreference};

    #[test]
    fn test_deserialize_full_config() {
        let toml_str = r#"
[council]
participants = ["claude", "gemini", "local"]
chair = "claude"
review_mode = "labeled"

[quorum]
r1_min = 2
r2_min = 2

[timeouts]
r1_ms = 90000
default_provider_ms = 60000

[timeouts.provider_ms]
gemini = 30000

[retry]
max_retries = 2

[transport]
preference = "secondary"

[transport.secondary.commands.local]
program = "llm"
args = ["-m", "{model}"]

[providers.local]
model = "llama-3.3-70b"
chair_eligible = false
"#;

        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_empty());

        let (council, issues) = config.to_council_config();
        assert!(issues.is_empty());
        assert_eq!(council.participants, vec!["claude", "gemini", "local"]);
        assert_eq!(council.review_mode, ReviewMode::Labeled);
        assert_eq!(council.quorum.r2_min, 2);
        assert!(council.quorum.r3_required);
        assert_eq!(council.timeouts.r1_ms, Some(90_000));
        assert_eq!(council.timeouts.provider_timeout_ms("gemini"), 30_000);
        assert_eq!(council.timeouts.provider_timeout_ms("claude"), 60_000);
        assert_eq!(council.retry.max_retries, 2);
        assert_eq!(council.retry.initial_backoff_ms, 1_000);
        assert_eq!(council.transport_preference, TransportPreference::Secondary);
        // Default commands survive alongside the added one
        assert!(config.transport.secondary.commands.contains_key("claude"));
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = FileConfig::default();
        assert!(config.validate().is_empty());
        let (council, _) = config.checked().unwrap();
        assert_eq!(council, CouncilConfig::default());
    }

    #[test]
    fn test_validate_collects_every_issue() {
        let toml_str = r#"
[council]
participants = ["claude", "mystery"]
short_circuit = "sometimes"

[quorum]
r2_min = 0

[retry]
multiplier = 0.5
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        let issues = config.validate();

        let has = |pred: &dyn Fn(&ConfigIssue) -> bool| issues.iter().any(pred);
        assert!(has(&|i| matches!(
            &i.code,
            ConfigIssueCode::InvalidEnumValue { field, .. } if field == "council.short_circuit"
        )));
        assert!(has(&|i| matches!(
            &i.code,
            ConfigIssueCode::InvalidConstraint { field, .. } if field == "quorum.r2_min"
        )));
        assert!(has(&|i| i.is_error()
            && matches!(
                &i.code,
                ConfigIssueCode::InvalidConstraint { field, .. } if field == "retry.multiplier"
            )));
        assert!(has(&|i| i.severity == Severity::Warning
            && matches!(&i.code, ConfigIssueCode::UnknownProvider { name } if name == "mystery")));
        assert!(has(&|i| matches!(
            &i.code,
            ConfigIssueCode::MissingTransportCommand { provider } if provider == "mystery"
        )));
    }

    #[test]
    fn test_checked_rejects_errors() {
        let mut config = FileConfig::default();
        config.council.participants = vec!["claude".to_string()];

        match config.checked() {
            Err(ConfigValidationError::Invalid(issues)) => {
                assert!(issues.iter().all(ConfigIssue::is_error));
                assert!(issues.iter().any(|i| matches!(
                    i.code,
                    ConfigIssueCode::QuorumUnreachable { .. }
                )));
            }
            other => panic!("expected invalid config, got {:?}", other),
        }

        config.council.allow_partial = true;
        assert!(config.checked().is_ok());
    }
}
