//! Infrastructure layer for llm-council
//!
//! This crate contains adapters that implement the ports defined in the
//! application layer: the two concrete transports, configuration file
//! loading, the JSONL event log, and the bootstrap that wires them up.

pub mod bootstrap;
pub mod config;
pub mod logging;
pub mod transport;

// Re-export commonly used types
pub use bootstrap::CouncilBootstrap;
pub use config::{
    ConfigLoader, ConfigValidationError, FileConfig, FileCouncilConfig, FileProviderConfig,
    FileTransportConfig,
};
pub use logging::JsonlEventLogger;
pub use transport::{
    CommandTemplate, CommandTransport, ToolInvocationError, ToolInvocationTransport,
    ToolServerSettings,
};
