//! Concrete transports
//!
//! - [`ToolInvocationTransport`]: primary channel, `tools/call` on a
//!   JSON-RPC stdio server
//! - [`CommandTransport`]: secondary channel, one CLI process per request

pub mod command;
pub mod tool_invocation;

pub use command::{CommandTemplate, CommandTransport};
pub use tool_invocation::{ToolInvocationError, ToolInvocationTransport, ToolServerSettings};
