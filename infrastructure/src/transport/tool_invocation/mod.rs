//! Primary transport: tool invocation over a JSON-RPC stdio server
//!
//! One server process is spawned on first use and shared by every request.
//! Each request becomes a `tools/call` whose arguments are the request
//! itself; the tool's reply is normalized into a [`TransportResult`].

pub mod connection;
pub mod error;
pub mod protocol;

pub use connection::ToolServerConnection;
pub use error::ToolInvocationError;

use async_trait::async_trait;
use council_application::{AvailabilityCache, Transport};
use council_domain::{ErrorType, TransportKind, TransportRequest, TransportResult};
use protocol::{ToolCallParams, ToolCallResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// How to start the tool server and which tool to call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolServerSettings {
    pub command: String,
    pub args: Vec<String>,
    pub tool: String,
    /// Bound on the `initialize` handshake
    pub init_timeout: Duration,
}

impl ToolServerSettings {
    pub fn new(command: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            tool: tool.into(),
            init_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }
}

pub struct ToolInvocationTransport {
    settings: ToolServerSettings,
    /// Held across spawn + initialize so concurrent first requests share
    /// one server.
    connection: Mutex<Option<Arc<ToolServerConnection>>>,
    availability: AvailabilityCache,
}

impl ToolInvocationTransport {
    pub fn new(settings: ToolServerSettings, availability: AvailabilityCache) -> Self {
        Self {
            settings,
            connection: Mutex::new(None),
            availability,
        }
    }

    pub fn settings(&self) -> &ToolServerSettings {
        &self.settings
    }

    /// Live connection, spawning and initializing the server if needed.
    async fn connection(&self) -> error::Result<Arc<ToolServerConnection>> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref()
            && conn.is_alive()
        {
            return Ok(Arc::clone(conn));
        }
        if slot.take().is_some() {
            info!("Tool server {} exited, respawning", self.settings.command);
        }

        let conn = Arc::new(ToolServerConnection::spawn(
            &self.settings.command,
            &self.settings.args,
        )?);
        conn.initialize(self.settings.init_timeout).await?;
        *slot = Some(Arc::clone(&conn));
        Ok(conn)
    }

    async fn drop_connection(&self) {
        let mut slot = self.connection.lock().await;
        if slot.take().is_some() {
            debug!("Dropped tool server connection");
        }
    }

    async fn detect(&self) -> bool {
        if let Err(e) = which::which(&self.settings.command) {
            debug!("Tool server {} not found: {}", self.settings.command, e);
            return false;
        }
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref()
            && !conn.is_alive()
        {
            debug!("Tool server process is gone; next send respawns it");
            *slot = None;
        }
        true
    }

    async fn call(&self, request: &TransportRequest) -> error::Result<serde_json::Value> {
        let params = serde_json::to_value(ToolCallParams::for_request(
            &self.settings.tool,
            request,
        )?)?;
        let conn = self.connection().await?;
        conn.request("tools/call", Some(params), request.timeout())
            .await
    }

    async fn failure(&self, error: ToolInvocationError, latency_ms: u64) -> TransportResult {
        if error.is_fatal() {
            self.drop_connection().await;
        }
        let (error_type, message) = classify_failure(&error);
        warn!("Tool call failed ({}): {}", error_type, message);
        TransportResult::error(error_type, message, latency_ms, TransportKind::Primary)
    }
}

/// Category and message of a failed tool call
fn classify_failure(error: &ToolInvocationError) -> (ErrorType, String) {
    match error {
        ToolInvocationError::Timeout(ms) => {
            (ErrorType::Timeout, format!("tool call timed out after {}ms", ms))
        }
        // Invalid params / method not found: the server rejects our call shape
        ToolInvocationError::Rpc { code, message } if *code == -32602 || *code == -32601 => {
            (ErrorType::InvalidRequest, message.clone())
        }
        ToolInvocationError::Rpc { message, .. } => (ErrorType::classify(message), message.clone()),
        ToolInvocationError::Spawn(e) => (
            ErrorType::Network,
            format!("could not start tool server: {}", e),
        ),
        ToolInvocationError::Serialization(e) => (
            ErrorType::InvalidRequest,
            format!("could not encode request: {}", e),
        ),
        ToolInvocationError::Io(_)
        | ToolInvocationError::Closed
        | ToolInvocationError::UnexpectedResponse(_) => (ErrorType::Network, error.to_string()),
    }
}

#[async_trait]
impl Transport for ToolInvocationTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Primary
    }

    async fn is_available(&self) -> bool {
        self.availability.check(|| self.detect()).await
    }

    async fn send(&self, request: &TransportRequest) -> TransportResult {
        let started = Instant::now();
        let latency_ms = || started.elapsed().as_millis() as u64;

        debug!(
            "tools/call {} for {} ({})",
            self.settings.tool, request.provider, request.model
        );

        // Spawning and the handshake count against the request timeout too.
        let outcome = tokio::time::timeout(request.timeout(), self.call(request)).await;
        let value = match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => return self.failure(e, latency_ms()).await,
            Err(_) => {
                return self
                    .failure(ToolInvocationError::Timeout(request.timeout_ms), latency_ms())
                    .await;
            }
        };

        match serde_json::from_value::<ToolCallResult>(value) {
            Ok(result) => result.into_transport_result(latency_ms()),
            Err(e) => TransportResult::error(
                ErrorType::ParseError,
                format!("malformed tool result: {}", e),
                latency_ms(),
                TransportKind::Primary,
            ),
        }
    }

    fn invalidate(&self) {
        self.availability.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use council_domain::{Message, Payload, TransportUsed};

    fn request() -> TransportRequest {
        TransportRequest {
            provider: "claude".to_string(),
            model: "claude-sonnet-4.5".to_string(),
            payload: Payload {
                system: None,
                messages: vec![Message::user("hello")],
                max_tokens: 256,
                temperature: 0.2,
            },
            timeout_ms: 2_000,
        }
    }

    fn missing_server() -> ToolInvocationTransport {
        ToolInvocationTransport::new(
            ToolServerSettings::new("council-test-no-such-tool-server", "ask"),
            AvailabilityCache::new(Duration::from_secs(5), Duration::from_secs(1)),
        )
    }

    #[tokio::test]
    async fn test_missing_server_is_unavailable() {
        let transport = missing_server();
        assert_eq!(transport.kind(), TransportKind::Primary);
        assert!(!transport.is_available().await);
    }

    #[tokio::test]
    async fn test_send_to_missing_server_is_network_error() {
        let transport = missing_server();
        let result = transport.send(&request()).await;

        assert!(!result.is_ok());
        assert_eq!(result.error_type(), Some(ErrorType::Network));
        assert!(result.is_retryable());
        assert_eq!(result.transport_used, TransportUsed::Primary);
        assert!(result.error_message().contains("could not start tool server"));
    }

    #[test]
    fn test_classify_failure() {
        let (t, _) = classify_failure(&ToolInvocationError::Timeout(5));
        assert_eq!(t, ErrorType::Timeout);

        let (t, _) = classify_failure(&ToolInvocationError::Rpc {
            code: -32602,
            message: "bad arguments".to_string(),
        });
        assert_eq!(t, ErrorType::InvalidRequest);

        let (t, m) = classify_failure(&ToolInvocationError::Rpc {
            code: -32000,
            message: "upstream said 401 Unauthorized".to_string(),
        });
        assert_eq!(t, ErrorType::Auth);
        assert!(m.contains("401"));

        let (t, _) = classify_failure(&ToolInvocationError::Closed);
        assert_eq!(t, ErrorType::Network);
    }

    #[test]
    fn test_settings_builder() {
        let settings = ToolServerSettings::new("council-mcp", "ask_llm")
            .with_args(vec!["--stdio".to_string()])
            .with_init_timeout(Duration::from_secs(3));
        assert_eq!(settings.args, vec!["--stdio"]);
        assert_eq!(settings.init_timeout, Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_server_that_exits_is_network_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("exits.sh");
        std::fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let transport = ToolInvocationTransport::new(
            ToolServerSettings::new(script.to_string_lossy(), "ask"),
            AvailabilityCache::new(Duration::from_secs(5), Duration::from_secs(1)),
        );
        assert!(transport.is_available().await);

        let result = transport.send(&request()).await;
        assert_eq!(result.error_type(), Some(ErrorType::Network));
        assert!(transport.connection.lock().await.is_none());
    }
}
