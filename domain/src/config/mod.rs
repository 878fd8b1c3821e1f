//! Run configuration and its validation

mod council;
mod validation;

pub use council::{CouncilConfig, ReviewMode, ShortCircuitMode, Timeouts};
pub use validation::{ConfigIssue, ConfigIssueCode, Severity};
