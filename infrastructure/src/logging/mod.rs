//! Logging infrastructure, structured run-event logging.
//!
//! Provides [`JsonlEventLogger`], a JSONL file writer that implements the
//! [`CouncilEventLogger`](council_application::CouncilEventLogger) port.

mod jsonl_logger;

pub use jsonl_logger::JsonlEventLogger;
