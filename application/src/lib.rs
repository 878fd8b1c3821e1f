//! Application layer for llm-council
//!
//! This crate contains the round executor, transport selection and port
//! definitions. It depends only on the domain layer.

pub mod ports;
pub mod transport;
pub mod use_cases;

// Re-export commonly used types
pub use ports::{
    event_logger::{CouncilEvent, CouncilEventKind, CouncilEventLogger, NoEventLogger},
    progress::{CouncilProgressNotifier, NoProgress},
    transport::Transport,
};
pub use transport::{AutoTransport, AvailabilityCache};
pub use use_cases::run_council::{RunCouncilError, RunCouncilInput, RunCouncilUseCase};
