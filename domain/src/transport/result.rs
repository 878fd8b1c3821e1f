//! Normalized transport result

use crate::core::error::ErrorType;
use serde::{Deserialize, Serialize};

/// Which concrete channel a transport implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Tool-invocation channel
    Primary,
    /// Command-execution channel
    Secondary,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Primary => "primary",
            TransportKind::Secondary => "secondary",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Channel selection for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportPreference {
    /// Try primary, fall back to secondary
    #[default]
    Auto,
    /// Primary channel only
    Primary,
    /// Secondary channel only
    Secondary,
}

impl std::str::FromStr for TransportPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(TransportPreference::Auto),
            "primary" | "tool" | "mcp" => Ok(TransportPreference::Primary),
            "secondary" | "command" | "cli" => Ok(TransportPreference::Secondary),
            other => Err(format!(
                "Unknown transport preference: {}. Valid: auto, primary, secondary",
                other
            )),
        }
    }
}

/// Channel that actually produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportUsed {
    Primary,
    Secondary,
    /// No channel could carry the request
    None,
}

impl From<TransportKind> for TransportUsed {
    fn from(kind: TransportKind) -> Self {
        match kind {
            TransportKind::Primary => TransportUsed::Primary,
            TransportKind::Secondary => TransportUsed::Secondary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportStatus {
    Ok,
    Error,
}

/// Token accounting reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Error detail of a failed call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportError {
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub message: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl TransportError {
    /// Error whose retryability follows the category.
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
            retryable: error_type.is_retryable(),
            retry_after_ms: None,
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Result of one transport call. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportResult {
    pub status: TransportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TransportError>,
    pub latency_ms: u64,
    pub transport_used: TransportUsed,
    /// Set when the Auto chooser had to leave the primary channel
    #[serde(default, skip_serializing_if = "is_false")]
    pub fallback: bool,
}

impl TransportResult {
    pub fn ok(content: impl Into<String>, latency_ms: u64, kind: TransportKind) -> Self {
        Self {
            status: TransportStatus::Ok,
            content: Some(content.into()),
            usage: None,
            error: None,
            latency_ms,
            transport_used: kind.into(),
            fallback: false,
        }
    }

    pub fn error(
        error_type: ErrorType,
        message: impl Into<String>,
        latency_ms: u64,
        kind: TransportKind,
    ) -> Self {
        Self::from_error(TransportError::new(error_type, message), latency_ms, kind.into())
    }

    pub fn from_error(error: TransportError, latency_ms: u64, used: TransportUsed) -> Self {
        Self {
            status: TransportStatus::Error,
            content: None,
            usage: None,
            error: Some(error),
            latency_ms,
            transport_used: used,
            fallback: false,
        }
    }

    /// Synthetic result when no channel could carry the request.
    pub fn unreachable(summary: impl Into<String>) -> Self {
        Self {
            status: TransportStatus::Error,
            content: None,
            usage: None,
            error: Some(TransportError {
                error_type: ErrorType::Network,
                message: summary.into(),
                retryable: false,
                retry_after_ms: None,
            }),
            latency_ms: 0,
            transport_used: TransportUsed::None,
            fallback: false,
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_retry_after(mut self, retry_after_ms: u64) -> Self {
        if let Some(error) = self.error.as_mut() {
            error.retry_after_ms = Some(retry_after_ms);
        }
        self
    }

    pub fn as_fallback(mut self) -> Self {
        self.fallback = true;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == TransportStatus::Ok
    }

    pub fn error_type(&self) -> Option<ErrorType> {
        self.error.as_ref().map(|e| e.error_type)
    }

    pub fn error_message(&self) -> &str {
        self.error.as_ref().map(|e| e.message.as_str()).unwrap_or("")
    }

    /// Whether the failure may be retried. Ok results are never retried.
    pub fn is_retryable(&self) -> bool {
        self.error.as_ref().is_some_and(|e| e.retryable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_wire_shape() {
        let result = TransportResult::ok("answer", 420, TransportKind::Primary)
            .with_usage(Usage::new(100, 20));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["content"], "answer");
        assert_eq!(value["usage"]["total_tokens"], 120);
        assert_eq!(value["transport_used"], "primary");
        assert!(value.get("error").is_none());
        assert!(value.get("fallback").is_none());
    }

    #[test]
    fn test_error_wire_shape() {
        let result = TransportResult::error(
            ErrorType::RateLimit,
            "slow down",
            12,
            TransportKind::Secondary,
        )
        .with_retry_after(3000)
        .as_fallback();
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"]["type"], "rate_limit");
        assert_eq!(value["error"]["retryable"], true);
        assert_eq!(value["error"]["retry_after_ms"], 3000);
        assert_eq!(value["fallback"], true);
    }

    #[test]
    fn test_unreachable() {
        let result = TransportResult::unreachable("primary: down; secondary: down");
        assert!(!result.is_ok());
        assert_eq!(result.error_type(), Some(ErrorType::Network));
        assert!(!result.is_retryable());
        assert_eq!(result.latency_ms, 0);
        assert_eq!(result.transport_used, TransportUsed::None);
    }

    #[test]
    fn test_deserialize_from_tool_server() {
        let json = r#"{"status":"ok","content":"hi","latency_ms":5,"transport_used":"primary"}"#;
        let result: TransportResult = serde_json::from_str(json).unwrap();
        assert!(result.is_ok());
        assert!(!result.fallback);
    }

    #[test]
    fn test_preference_parse() {
        assert_eq!(
            "auto".parse::<TransportPreference>().unwrap(),
            TransportPreference::Auto
        );
        assert_eq!(
            "CLI".parse::<TransportPreference>().unwrap(),
            TransportPreference::Secondary
        );
        assert!("carrier-pigeon".parse::<TransportPreference>().is_err());
    }

    #[test]
    fn test_usage_add() {
        let mut total = Usage::default();
        total.add(&Usage::new(10, 5));
        total.add(&Usage::new(1, 2));
        assert_eq!(total, Usage::new(11, 7));
    }
}
