//! Providers: descriptors, adapters and the registry

pub mod adapter;
pub mod builtin;
pub mod capabilities;
pub mod registry;

pub use adapter::{PreparedRequest, ProviderAdapter, RequestOptions, StandardAdapter};
pub use capabilities::{ProviderCapabilities, ProviderDescriptor};
pub use registry::ProviderRegistry;
