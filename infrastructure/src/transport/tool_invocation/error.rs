//! Error types for the tool-server connection

use thiserror::Error;

/// Result type alias for tool-server operations
pub type Result<T> = std::result::Result<T, ToolInvocationError>;

/// Errors that can occur while talking to a tool server
#[derive(Error, Debug)]
pub enum ToolInvocationError {
    #[error("Failed to spawn tool server: {0}")]
    Spawn(std::io::Error),

    #[error("Tool server I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("JSON-RPC error (code {code}): {message}")]
    Rpc { code: i64, message: String },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Tool server connection closed")]
    Closed,

    #[error("Request timed out after {0}ms")]
    Timeout(u64),
}

impl ToolInvocationError {
    /// Whether the connection is unusable after this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ToolInvocationError::Spawn(_) | ToolInvocationError::Io(_) | ToolInvocationError::Closed
        )
    }
}
