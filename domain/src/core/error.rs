//! Error taxonomy for council runs
//!
//! [`ErrorType`] is the category carried by transport results and
//! provider failures. [`DomainError`] covers the few conditions that
//! abort a run before any provider is contacted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a failed provider interaction.
///
/// Only `rate_limit`, `network` and `timeout` are retryable. The last three
/// categories never come out of a transport: `quorum_unmet` and
/// `chair_failure` are round-level outcomes, `cancelled` marks calls
/// interrupted by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Auth,
    RateLimit,
    Network,
    Timeout,
    InvalidRequest,
    ParseError,
    QuorumUnmet,
    ChairFailure,
    Cancelled,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Auth => "auth",
            ErrorType::RateLimit => "rate_limit",
            ErrorType::Network => "network",
            ErrorType::Timeout => "timeout",
            ErrorType::InvalidRequest => "invalid_request",
            ErrorType::ParseError => "parse_error",
            ErrorType::QuorumUnmet => "quorum_unmet",
            ErrorType::ChairFailure => "chair_failure",
            ErrorType::Cancelled => "cancelled",
        }
    }

    /// Whether a request failing with this category may be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorType::RateLimit | ErrorType::Network | ErrorType::Timeout
        )
    }

    /// Classify a free-form failure message (stderr, RPC error text, HTTP
    /// status line) into a category.
    ///
    /// Unrecognised messages are treated as `network`: the failure happened
    /// somewhere between us and the provider and nothing says it is permanent.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if has(&["rate limit", "rate_limit", "ratelimit", "429", "too many requests", "quota"]) {
            ErrorType::RateLimit
        } else if has(&[
            "unauthorized",
            "unauthenticated",
            "forbidden",
            "401",
            "403",
            "api key",
            "api_key",
            "not logged in",
            "login required",
            "authentication",
        ]) {
            ErrorType::Auth
        } else if has(&["timed out", "timeout", "deadline exceeded"]) {
            ErrorType::Timeout
        } else if has(&[
            "invalid request",
            "invalid_request",
            "bad request",
            "400",
            "context length",
            "too long",
            "unknown model",
            "unsupported model",
        ]) {
            ErrorType::InvalidRequest
        } else {
            ErrorType::Network
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ErrorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auth" => Ok(ErrorType::Auth),
            "rate_limit" => Ok(ErrorType::RateLimit),
            "network" => Ok(ErrorType::Network),
            "timeout" => Ok(ErrorType::Timeout),
            "invalid_request" => Ok(ErrorType::InvalidRequest),
            "parse_error" => Ok(ErrorType::ParseError),
            "quorum_unmet" => Ok(ErrorType::QuorumUnmet),
            "chair_failure" => Ok(ErrorType::ChairFailure),
            "cancelled" => Ok(ErrorType::Cancelled),
            other => Err(format!("Unknown error type: {}", other)),
        }
    }
}

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No registered participants")]
    NoParticipants,

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Unparseable {round} output: {reason}")]
    Parse { round: String, reason: String },
}

impl DomainError {
    /// Check if this error represents a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DomainError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_set() {
        assert!(ErrorType::RateLimit.is_retryable());
        assert!(ErrorType::Network.is_retryable());
        assert!(ErrorType::Timeout.is_retryable());

        assert!(!ErrorType::Auth.is_retryable());
        assert!(!ErrorType::InvalidRequest.is_retryable());
        assert!(!ErrorType::ParseError.is_retryable());
        assert!(!ErrorType::QuorumUnmet.is_retryable());
        assert!(!ErrorType::ChairFailure.is_retryable());
        assert!(!ErrorType::Cancelled.is_retryable());
    }

    #[test]
    fn test_classify_messages() {
        assert_eq!(
            ErrorType::classify("HTTP 429 Too Many Requests"),
            ErrorType::RateLimit
        );
        assert_eq!(
            ErrorType::classify("Error: not logged in, run `claude login`"),
            ErrorType::Auth
        );
        assert_eq!(ErrorType::classify("request timed out"), ErrorType::Timeout);
        assert_eq!(
            ErrorType::classify("400 Bad Request: prompt too long"),
            ErrorType::InvalidRequest
        );
        assert_eq!(
            ErrorType::classify("connection refused"),
            ErrorType::Network
        );
        assert_eq!(ErrorType::classify(""), ErrorType::Network);
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&ErrorType::RateLimit).unwrap();
        assert_eq!(json, "\"rate_limit\"");
        let parsed: ErrorType = serde_json::from_str("\"invalid_request\"").unwrap();
        assert_eq!(parsed, ErrorType::InvalidRequest);
    }

    #[test]
    fn test_from_str_roundtrip_names() {
        for t in [ErrorType::Auth, ErrorType::ParseError, ErrorType::Cancelled] {
            assert_eq!(t.as_str().parse::<ErrorType>().unwrap(), t);
        }
        assert!("bogus".parse::<ErrorType>().is_err());
    }

    #[test]
    fn test_cancelled_error_display() {
        assert_eq!(DomainError::Cancelled.to_string(), "Operation cancelled");
        assert!(DomainError::Cancelled.is_cancelled());
        assert!(!DomainError::NoParticipants.is_cancelled());
    }
}
