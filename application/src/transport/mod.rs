//! Transport selection shared by every round

pub mod auto;
pub mod availability;

pub use auto::AutoTransport;
pub use availability::AvailabilityCache;
