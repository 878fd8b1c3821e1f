//! Transport port
//!
//! A transport carries one [`TransportRequest`] to a provider and returns a
//! normalized [`TransportResult`]. Failures are data, not `Err`: every
//! outcome, including timeouts and unreachable channels, comes back as a
//! result with `status = error` and a categorized error.

use async_trait::async_trait;
use council_domain::{TransportKind, TransportRequest, TransportResult};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Which channel this transport implements
    fn kind(&self) -> TransportKind;

    /// Whether the channel can currently carry requests.
    ///
    /// Implementations bound this by a short availability timeout and may cache
    /// the answer briefly.
    async fn is_available(&self) -> bool;

    /// Send one request. Must honor `request.timeout_ms`.
    async fn send(&self, request: &TransportRequest) -> TransportResult;

    /// Drop any cached availability so the next check checks again.
    fn invalidate(&self) {}
}
