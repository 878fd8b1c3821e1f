//! Run options from TOML (`[council]` section)
//!
//! ```toml
//! [council]
//! participants = ["claude", "codex", "gemini"]
//! chair = "claude"
//! short_circuit = "disabled"    # or "unanimous"
//! allow_partial = false
//! review_mode = "anonymized"    # or "labeled"
//! exclude_self_review = true
//! temperature = 0.2
//! event_log = "~/.local/state/llm-council/events.jsonl"
//! ```

use council_domain::{ConfigIssue, ConfigIssueCode, CouncilConfig, ReviewMode, ShortCircuitMode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCouncilConfig {
    pub participants: Vec<String>,
    pub chair: Option<String>,
    pub short_circuit: String,
    pub allow_partial: bool,
    pub review_mode: String,
    pub exclude_self_review: bool,
    pub temperature: f32,
    pub max_output_tokens: Option<u32>,
    /// JSONL file receiving structured run events
    pub event_log: Option<PathBuf>,
}

impl Default for FileCouncilConfig {
    fn default() -> Self {
        let defaults = CouncilConfig::default();
        Self {
            participants: defaults.participants,
            chair: None,
            short_circuit: defaults.short_circuit.as_str().to_string(),
            allow_partial: defaults.allow_partial,
            review_mode: defaults.review_mode.as_str().to_string(),
            exclude_self_review: defaults.exclude_self_review,
            temperature: defaults.temperature,
            max_output_tokens: None,
            event_log: None,
        }
    }
}

impl FileCouncilConfig {
    pub fn parse_short_circuit(&self) -> (ShortCircuitMode, Vec<ConfigIssue>) {
        parse_enum(
            "council.short_circuit",
            &self.short_circuit,
            &["disabled", "unanimous"],
        )
    }

    pub fn parse_review_mode(&self) -> (ReviewMode, Vec<ConfigIssue>) {
        parse_enum(
            "council.review_mode",
            &self.review_mode,
            &["anonymized", "labeled"],
        )
    }

    /// Apply this section onto `config`
    pub fn apply(&self, config: &mut CouncilConfig) -> Vec<ConfigIssue> {
        let (short_circuit, mut issues) = self.parse_short_circuit();
        let (review_mode, review_issues) = self.parse_review_mode();
        issues.extend(review_issues);

        config.participants = self.participants.clone();
        config.chair = self.chair.clone();
        config.short_circuit = short_circuit;
        config.allow_partial = self.allow_partial;
        config.review_mode = review_mode;
        config.exclude_self_review = self.exclude_self_review;
        config.temperature = self.temperature;
        config.max_output_tokens = self.max_output_tokens;
        issues
    }
}

/// Parse an enum-valued string, warning and falling back to the default on
/// an unknown value.
pub(crate) fn parse_enum<T>(field: &str, value: &str, valid: &[&str]) -> (T, Vec<ConfigIssue>)
where
    T: std::str::FromStr + Default,
{
    match value.parse::<T>() {
        Ok(parsed) => (parsed, Vec::new()),
        Err(_) => (
            T::default(),
            vec![ConfigIssue::warning(
                ConfigIssueCode::InvalidEnumValue {
                    field: field.to_string(),
                    value: value.to_string(),
                    valid_values: valid.iter().map(|v| v.to_string()).collect(),
                },
                format!(
                    "{}: unknown value '{}', falling back to '{}'",
                    field, value, valid[0]
                ),
            )],
        ),
    }
}
