//! JSON-RPC protocol types for tool-server communication.
//!
//! The tool server is a child process speaking JSON-RPC 2.0 over stdio,
//! each message framed by a `Content-Length` header.
//!
//! # Protocol Overview
//!
//! - **`initialize`**: sent once per spawned server before any call
//! - **`notifications/initialized`**: acknowledges the handshake
//! - **`tools/call`**: one per provider request; `arguments` is the
//!   [`TransportRequest`] JSON, the reply is a tool result with text
//!   content blocks

use council_domain::{ErrorType, TransportKind, TransportRequest, TransportResult, Usage};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Global request ID counter for JSON-RPC requests.
static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    REQUEST_ID.fetch_add(1, Ordering::SeqCst)
}

/// JSON-RPC request
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Creates a new JSON-RPC request with an auto-generated ID.
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: next_id(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC notification (no id, no reply expected)
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC response
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<u64>,
    pub result: Option<serde_json::Value>,
    pub error: Option<RpcError>,
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Error reply to a request the server sent us
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorOut {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub error: RpcError,
}

impl JsonRpcErrorOut {
    pub fn method_not_found(id: u64, method: &str) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            error: RpcError {
                code: -32601,
                message: format!("Method not found: {}", method),
                data: None,
            },
        }
    }
}

/// Classification of incoming JSON-RPC messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// A response to a request we sent (has `id`, no `method`).
    Response,
    /// A request from the server (has `id` + `method`).
    IncomingRequest { id: u64 },
    /// A notification (has `method`, no `id`).
    Notification,
}

/// Classify a JSON-RPC message by inspecting `id` and `method` fields.
pub fn classify_message(json: &serde_json::Value) -> MessageKind {
    let has_id = json.get("id").and_then(|v| v.as_u64());
    let has_method = json.get("method").and_then(|v| v.as_str());

    match (has_id, has_method) {
        (Some(id), Some(_)) => MessageKind::IncomingRequest { id },
        (Some(_), None) => MessageKind::Response,
        _ => MessageKind::Notification,
    }
}

/// `initialize` parameters
pub fn initialize_params() -> serde_json::Value {
    serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": "llm-council",
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

/// `tools/call` parameters
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallParams {
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCallParams {
    pub fn for_request(tool: &str, request: &TransportRequest) -> serde_json::Result<Self> {
        Ok(Self {
            name: tool.to_string(),
            arguments: serde_json::to_value(request)?,
        })
    }
}

/// One content block of a tool result. Only text blocks carry an answer.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Token counts as tool servers report them; `total_tokens` is optional.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct WireUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: Option<u64>,
}

impl From<WireUsage> for Usage {
    fn from(wire: WireUsage) -> Self {
        let mut usage = Usage::new(wire.prompt_tokens, wire.completion_tokens);
        if let Some(total) = wire.total_tokens {
            usage.total_tokens = total;
        }
        usage
    }
}

/// Result of a `tools/call`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolCallResult {
    pub content: Vec<ContentBlock>,
    pub is_error: bool,
    pub usage: Option<WireUsage>,
    pub structured_content: Option<serde_json::Value>,
}

impl ToolCallResult {
    /// Concatenated text of all text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Normalize into a [`TransportResult`] tagged as primary.
    ///
    /// A server that already answers with a full transport result (as
    /// structured content or as the text itself) is taken at its word;
    /// latency is always our own measurement.
    pub fn into_transport_result(self, latency_ms: u64) -> TransportResult {
        let text = self.text();

        let embedded = self
            .structured_content
            .clone()
            .and_then(|v| serde_json::from_value::<TransportResult>(v).ok())
            .or_else(|| serde_json::from_str::<TransportResult>(text.trim()).ok());
        if let Some(mut result) = embedded {
            result.latency_ms = latency_ms;
            result.transport_used = TransportKind::Primary.into();
            result.fallback = false;
            return result;
        }

        if self.is_error {
            let message = if text.trim().is_empty() {
                "tool reported an error without detail".to_string()
            } else {
                text
            };
            return TransportResult::error(
                ErrorType::classify(&message),
                message,
                latency_ms,
                TransportKind::Primary,
            );
        }

        let result = TransportResult::ok(text, latency_ms, TransportKind::Primary);
        match self.usage {
            Some(usage) => result.with_usage(usage.into()),
            None => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use council_domain::{Payload, TransportUsed};

    fn parse(value: serde_json::Value) -> ToolCallResult {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_classify_message() {
        let response = serde_json::json!({"jsonrpc": "2.0", "id": 3, "result": {}});
        let request = serde_json::json!({"jsonrpc": "2.0", "id": 9, "method": "ping"});
        let note = serde_json::json!({"jsonrpc": "2.0", "method": "notifications/progress"});

        assert_eq!(classify_message(&response), MessageKind::Response);
        assert_eq!(
            classify_message(&request),
            MessageKind::IncomingRequest { id: 9 }
        );
        assert_eq!(classify_message(&note), MessageKind::Notification);
    }

    #[test]
    fn test_request_ids_increase() {
        let a = JsonRpcRequest::new("tools/call", None);
        let b = JsonRpcRequest::new("tools/call", None);
        assert!(b.id > a.id);
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert!(json.get("params").is_none());
    }

    #[test]
    fn test_tool_call_params_carry_request() {
        let request = TransportRequest {
            provider: "claude".to_string(),
            model: "claude-sonnet-4.5".to_string(),
            payload: Payload {
                system: None,
                messages: vec![council_domain::Message::user("hi")],
                max_tokens: 100,
                temperature: 0.2,
            },
            timeout_ms: 5_000,
        };
        let params = ToolCallParams::for_request("ask_llm", &request).unwrap();
        assert_eq!(params.name, "ask_llm");
        assert_eq!(params.arguments["provider"], "claude");
        assert_eq!(params.arguments["payload"]["messages"][0]["role"], "user");
        assert_eq!(params.arguments["timeout_ms"], 5_000);
    }

    #[test]
    fn test_text_result_with_usage() {
        let result = parse(serde_json::json!({
            "content": [
                {"type": "text", "text": "first"},
                {"type": "image", "data": "..."},
                {"type": "text", "text": "second"}
            ],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        }))
        .into_transport_result(42);

        assert!(result.is_ok());
        assert_eq!(result.content.as_deref(), Some("first\nsecond"));
        assert_eq!(result.latency_ms, 42);
        assert_eq!(result.transport_used, TransportUsed::Primary);
        assert_eq!(result.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_error_result_is_classified() {
        let result = parse(serde_json::json!({
            "content": [{"type": "text", "text": "429 Too Many Requests"}],
            "isError": true
        }))
        .into_transport_result(7);

        assert!(!result.is_ok());
        assert_eq!(result.error_type(), Some(ErrorType::RateLimit));
        assert!(result.is_retryable());
    }

    #[test]
    fn test_error_without_text() {
        let result = parse(serde_json::json!({"isError": true})).into_transport_result(0);
        assert_eq!(result.error_type(), Some(ErrorType::Network));
        assert!(result.error_message().contains("without detail"));
    }

    #[test]
    fn test_embedded_transport_result_is_trusted() {
        let embedded = serde_json::json!({
            "status": "error",
            "error": {"type": "auth", "message": "not logged in", "retryable": false},
            "latency_ms": 999,
            "transport_used": "secondary"
        });
        let result = parse(serde_json::json!({
            "content": [{"type": "text", "text": embedded.to_string()}]
        }))
        .into_transport_result(12);

        assert_eq!(result.error_type(), Some(ErrorType::Auth));
        assert_eq!(result.latency_ms, 12);
        assert_eq!(result.transport_used, TransportUsed::Primary);
    }

    #[test]
    fn test_structured_content_wins() {
        let result = parse(serde_json::json!({
            "content": [{"type": "text", "text": "ignored"}],
            "structuredContent": {
                "status": "ok",
                "content": "structured answer",
                "latency_ms": 0,
                "transport_used": "primary"
            }
        }))
        .into_transport_result(5);

        assert_eq!(result.content.as_deref(), Some("structured answer"));
    }
}
