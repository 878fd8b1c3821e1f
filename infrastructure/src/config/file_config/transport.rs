//! Transport configuration from TOML (`[transport]` section)
//!
//! ```toml
//! [transport]
//! preference = "auto"            # "primary" | "secondary"
//!
//! [transport.primary]
//! command = "council-mcp"
//! args = ["--stdio"]
//! tool = "ask"
//!
//! [transport.secondary.commands.claude]
//! program = "claude"
//! args = ["-p", "--model", "{model}"]
//! ```

use super::council::parse_enum;
use crate::transport::{CommandTemplate, ToolServerSettings};
use council_domain::{ConfigIssue, ConfigIssueCode, TransportPreference};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileTransportConfig {
    pub preference: String,
    pub primary: FilePrimaryTransportConfig,
    pub secondary: FileSecondaryTransportConfig,
}

impl Default for FileTransportConfig {
    fn default() -> Self {
        Self {
            preference: "auto".to_string(),
            primary: FilePrimaryTransportConfig::default(),
            secondary: FileSecondaryTransportConfig::default(),
        }
    }
}

/// Tool server for the primary channel. No command, no primary channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilePrimaryTransportConfig {
    pub command: Option<String>,
    pub args: Vec<String>,
    pub tool: String,
    pub init_timeout_ms: u64,
}

impl Default for FilePrimaryTransportConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            tool: "ask".to_string(),
            init_timeout_ms: 10_000,
        }
    }
}

impl FilePrimaryTransportConfig {
    pub fn settings(&self) -> Option<ToolServerSettings> {
        let command = self.command.as_deref().filter(|c| !c.trim().is_empty())?;
        Some(
            ToolServerSettings::new(command, self.tool.clone())
                .with_args(self.args.clone())
                .with_init_timeout(Duration::from_millis(self.init_timeout_ms)),
        )
    }
}

/// Per-provider CLI commands for the secondary channel. Sections add to or
/// replace the built-in commands; the built-ins for providers a file does
/// not mention stay in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSecondaryTransportConfig {
    #[serde(deserialize_with = "with_builtin_commands")]
    pub commands: BTreeMap<String, CommandTemplate>,
}

impl Default for FileSecondaryTransportConfig {
    fn default() -> Self {
        Self {
            commands: builtin_commands(),
        }
    }
}

fn builtin_commands() -> BTreeMap<String, CommandTemplate> {
    BTreeMap::from([
        (
            "claude".to_string(),
            CommandTemplate::new("claude", &["-p", "--model", "{model}"]),
        ),
        (
            "codex".to_string(),
            CommandTemplate::new("codex", &["exec", "--model", "{model}", "-"]),
        ),
        (
            "gemini".to_string(),
            CommandTemplate::new("gemini", &["--model", "{model}"]),
        ),
    ])
}

fn with_builtin_commands<'de, D>(deserializer: D) -> Result<BTreeMap<String, CommandTemplate>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut commands = BTreeMap::<String, CommandTemplate>::deserialize(deserializer)?;
    for (provider, template) in builtin_commands() {
        commands.entry(provider).or_insert(template);
    }
    Ok(commands)
}

impl FileTransportConfig {
    pub fn parse_preference(&self) -> (TransportPreference, Vec<ConfigIssue>) {
        parse_enum(
            "transport.preference",
            &self.preference,
            &["auto", "primary", "secondary"],
        )
    }

    /// Check that the chosen channels can reach every participant.
    pub fn validate(&self, participants: &[String]) -> Vec<ConfigIssue> {
        let (preference, mut issues) = self.parse_preference();

        for (provider, template) in &self.secondary.commands {
            if template.program.trim().is_empty() {
                issues.push(ConfigIssue::error(
                    ConfigIssueCode::EmptyName {
                        field: format!("transport.secondary.commands.{}.program", provider),
                    },
                    format!(
                        "transport.secondary.commands.{}: program cannot be empty",
                        provider
                    ),
                ));
            }
        }

        let has_primary = self.primary.settings().is_some();
        if preference == TransportPreference::Primary && !has_primary {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::InvalidConstraint {
                    field: "transport.primary.command".to_string(),
                    reason: "required when preference = \"primary\"".to_string(),
                },
                "transport.primary.command is required when preference = \"primary\"",
            ));
        }

        if preference != TransportPreference::Primary {
            // Without a primary channel a missing command is fatal for that
            // provider; with one it only removes the fallback.
            let fatal = preference == TransportPreference::Secondary || !has_primary;
            for provider in participants {
                if self.secondary.commands.contains_key(provider) {
                    continue;
                }
                let code = ConfigIssueCode::MissingTransportCommand {
                    provider: provider.clone(),
                };
                let message = format!(
                    "transport.secondary.commands.{}: no command configured",
                    provider
                );
                issues.push(if fatal {
                    ConfigIssue::error(code, message)
                } else {
                    ConfigIssue::warning(code, message)
                });
            }
        }

        issues
    }
}
