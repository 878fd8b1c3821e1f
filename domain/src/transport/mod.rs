//! Transport boundary types
//!
//! These are the value objects exchanged with a transport. Their JSON shape
//! is the interoperability contract with tool servers and command wrappers:
//!
//! ```text
//! TransportRequest { provider, model, payload:{system?, messages:[{role, content}], max_tokens, temperature}, timeout_ms }
//! TransportResult  { status: ok|error, content?, usage?:{prompt_tokens, completion_tokens, total_tokens},
//!                    error?:{type, message, retryable, retry_after_ms?}, latency_ms, transport_used }
//! ```

pub mod request;
pub mod result;

pub use request::{Message, Payload, Role, TransportRequest};
pub use result::{
    TransportError, TransportKind, TransportPreference, TransportResult, TransportStatus,
    TransportUsed, Usage,
};
