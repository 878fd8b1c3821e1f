//! Configuration issues
//!
//! Validation never fails hard: it returns every issue it finds, each with
//! a severity, and lets the caller decide whether to stop.
//!
//! ```
//! use council_domain::config::{CouncilConfig, Severity};
//!
//! let config = CouncilConfig::default();
//! let issues = config.validate();
//! assert!(issues.iter().all(|i| i.severity != Severity::Error));
//! ```

/// Severity level of a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Fatal: the configuration cannot work at all.
    Error,
    /// Non-fatal: the configuration works but may not behave as expected.
    Warning,
}

/// Identifies a specific configuration issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigIssueCode {
    /// A name field is empty or whitespace.
    EmptyName { field: String },
    /// A string field holds a value outside its enumeration.
    InvalidEnumValue {
        field: String,
        value: String,
        valid_values: Vec<String>,
    },
    /// A numeric field violates its bounds.
    InvalidConstraint { field: String, reason: String },
    /// A configured participant or chair is not registered.
    UnknownProvider { name: String },
    /// A participant is listed more than once.
    DuplicateProvider { name: String },
    /// The configured chair exists but may not chair.
    ChairNotEligible { name: String },
    /// A round minimum can never be met by the configured participants.
    QuorumUnreachable {
        field: String,
        required: usize,
        available: usize,
    },
    /// No way to reach a provider over the secondary channel.
    MissingTransportCommand { provider: String },
}

/// A detected issue in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub severity: Severity,
    pub code: ConfigIssueCode,
    pub message: String,
}

impl ConfigIssue {
    pub fn error(code: ConfigIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
        }
    }

    pub fn warning(code: ConfigIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {}", level, self.message)
    }
}
