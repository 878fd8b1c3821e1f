//! Channel selection with fallback
//!
//! [`AutoTransport`] owns up to two concrete transports and decides, per
//! request, which one carries it. Under [`TransportPreference::Auto`] the
//! primary channel is tried first and any failure (unavailable, transport
//! error, provider error) falls through to the secondary. When only one
//! channel actually ran, its own result is returned; the synthetic
//! `network` error is reserved for no channel running or both failing.
//! A single-channel preference never touches the other channel.

use crate::ports::transport::Transport;
use council_domain::{
    TransportKind, TransportPreference, TransportRequest, TransportResult, TransportUsed,
};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct AutoTransport {
    primary: Option<Arc<dyn Transport>>,
    secondary: Option<Arc<dyn Transport>>,
    preference: TransportPreference,
}

impl AutoTransport {
    pub fn new(primary: Option<Arc<dyn Transport>>, secondary: Option<Arc<dyn Transport>>) -> Self {
        Self {
            primary,
            secondary,
            preference: TransportPreference::Auto,
        }
    }

    pub fn with_preference(mut self, preference: TransportPreference) -> Self {
        self.preference = preference;
        self
    }

    pub fn preference(&self) -> TransportPreference {
        self.preference
    }

    /// Carry one request over the preferred channel(s).
    ///
    /// Never fails: when no channel could run, or both ran and failed, the
    /// result is a synthetic non-retryable `network` error with
    /// `transport_used = none`. It is flagged `fallback` whenever the
    /// secondary was attempted.
    pub async fn send(&self, request: &TransportRequest) -> TransportResult {
        match self.preference {
            TransportPreference::Primary => {
                self.send_only(self.primary.as_deref(), TransportKind::Primary, request)
                    .await
            }
            TransportPreference::Secondary => {
                self.send_only(self.secondary.as_deref(), TransportKind::Secondary, request)
                    .await
            }
            TransportPreference::Auto => self.send_auto(request).await,
        }
    }

    async fn send_only(
        &self,
        transport: Option<&dyn Transport>,
        kind: TransportKind,
        request: &TransportRequest,
    ) -> TransportResult {
        let Some(transport) = transport else {
            return TransportResult::unreachable(format!("{} transport not configured", kind));
        };
        if !transport.is_available().await {
            return TransportResult::unreachable(format!("{} transport unavailable", kind));
        }

        let result = tag(transport.send(request).await, kind);
        if !result.is_ok() {
            transport.invalidate();
        }
        result
    }

    async fn send_auto(&self, request: &TransportRequest) -> TransportResult {
        let mut failures: Vec<String> = Vec::new();

        let primary_failure = match self.primary.as_deref() {
            Some(primary) if primary.is_available().await => {
                let result = tag(primary.send(request).await, TransportKind::Primary);
                if result.is_ok() {
                    return result;
                }
                primary.invalidate();
                warn!(
                    provider = %request.provider,
                    error = result.error_message(),
                    "Primary transport failed, trying secondary"
                );
                failures.push(format!("primary: {}", result.error_message()));
                Some(result)
            }
            Some(_) => {
                debug!(provider = %request.provider, "Primary transport unavailable");
                failures.push("primary: unavailable".to_string());
                None
            }
            None => {
                failures.push("primary: not configured".to_string());
                None
            }
        };

        match self.secondary.as_deref() {
            Some(secondary) if secondary.is_available().await => {
                let result = tag(secondary.send(request).await, TransportKind::Secondary)
                    .as_fallback();
                if result.is_ok() {
                    return result;
                }
                secondary.invalidate();
                if primary_failure.is_none() {
                    // Secondary was the only channel tried; its failure stands as is.
                    return result;
                }
                failures.push(format!("secondary: {}", result.error_message()));
                warn!(provider = %request.provider, "Both transports failed");
                TransportResult::unreachable(format!(
                    "No transport succeeded ({})",
                    failures.join("; ")
                ))
                .as_fallback()
            }
            other => {
                if let Some(result) = primary_failure {
                    // Nothing to fall back to; keep the primary's category and retryability.
                    debug!(provider = %request.provider, "No secondary to fall back to");
                    return result;
                }
                failures.push(match other {
                    Some(_) => "secondary: unavailable".to_string(),
                    None => "secondary: not configured".to_string(),
                });
                warn!(provider = %request.provider, "No transport could carry the request");
                TransportResult::unreachable(format!(
                    "No transport succeeded ({})",
                    failures.join("; ")
                ))
            }
        }
    }
}

/// Stamp the channel that carried a result, whatever the transport reported.
fn tag(mut result: TransportResult, kind: TransportKind) -> TransportResult {
    result.transport_used = TransportUsed::from(kind);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use council_domain::{ErrorType, Message, Payload};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeTransport {
        kind: TransportKind,
        available: bool,
        reply: Mutex<Option<TransportResult>>,
        sends: AtomicUsize,
        invalidated: AtomicBool,
    }

    impl FakeTransport {
        fn new(kind: TransportKind, available: bool, reply: TransportResult) -> Arc<Self> {
            Arc::new(Self {
                kind,
                available,
                reply: Mutex::new(Some(reply)),
                sends: AtomicUsize::new(0),
                invalidated: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        fn kind(&self) -> TransportKind {
            self.kind
        }

        async fn is_available(&self) -> bool {
            self.available
        }

        async fn send(&self, _request: &TransportRequest) -> TransportResult {
            self.sends.fetch_add(1, Ordering::SeqCst);
            self.reply.lock().unwrap().clone().unwrap()
        }

        fn invalidate(&self) {
            self.invalidated.store(true, Ordering::SeqCst);
        }
    }

    fn request() -> TransportRequest {
        TransportRequest {
            provider: "claude".to_string(),
            model: "claude-sonnet-4.5".to_string(),
            payload: Payload {
                system: None,
                messages: vec![Message::user("q")],
                max_tokens: 100,
                temperature: 0.2,
            },
            timeout_ms: 1000,
        }
    }

    fn ok(kind: TransportKind) -> TransportResult {
        TransportResult::ok("answer", 10, kind)
    }

    fn rate_limited(kind: TransportKind) -> TransportResult {
        TransportResult::error(ErrorType::RateLimit, "slow down", 5, kind)
    }

    #[tokio::test]
    async fn test_primary_success_not_fallback() {
        let primary = FakeTransport::new(TransportKind::Primary, true, ok(TransportKind::Primary));
        let secondary =
            FakeTransport::new(TransportKind::Secondary, true, ok(TransportKind::Secondary));
        let auto = AutoTransport::new(Some(primary.clone()), Some(secondary.clone()));

        let result = auto.send(&request()).await;
        assert!(result.is_ok());
        assert_eq!(result.transport_used, TransportUsed::Primary);
        assert!(!result.fallback);
        assert_eq!(secondary.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_primary_unavailable_falls_back() {
        let primary = FakeTransport::new(TransportKind::Primary, false, ok(TransportKind::Primary));
        let secondary =
            FakeTransport::new(TransportKind::Secondary, true, ok(TransportKind::Secondary));
        let auto = AutoTransport::new(Some(primary.clone()), Some(secondary));

        let result = auto.send(&request()).await;
        assert!(result.is_ok());
        assert_eq!(result.transport_used, TransportUsed::Secondary);
        assert!(result.fallback);
        assert_eq!(primary.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_primary_error_falls_back_and_invalidates() {
        let primary = FakeTransport::new(
            TransportKind::Primary,
            true,
            rate_limited(TransportKind::Primary),
        );
        let secondary =
            FakeTransport::new(TransportKind::Secondary, true, ok(TransportKind::Secondary));
        let auto = AutoTransport::new(Some(primary.clone()), Some(secondary));

        let result = auto.send(&request()).await;
        assert!(result.is_ok());
        assert!(result.fallback);
        assert!(primary.invalidated.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_both_unavailable_is_synthetic_network_error() {
        let primary = FakeTransport::new(TransportKind::Primary, false, ok(TransportKind::Primary));
        let secondary =
            FakeTransport::new(TransportKind::Secondary, false, ok(TransportKind::Secondary));
        let auto = AutoTransport::new(Some(primary), Some(secondary));

        let result = auto.send(&request()).await;
        assert!(!result.is_ok());
        assert_eq!(result.error_type(), Some(ErrorType::Network));
        assert!(!result.is_retryable());
        assert_eq!(result.latency_ms, 0);
        assert_eq!(result.transport_used, TransportUsed::None);
    }

    #[tokio::test]
    async fn test_both_fail_is_synthetic() {
        let primary = FakeTransport::new(
            TransportKind::Primary,
            true,
            rate_limited(TransportKind::Primary),
        );
        let secondary = FakeTransport::new(
            TransportKind::Secondary,
            true,
            rate_limited(TransportKind::Secondary),
        );
        let auto = AutoTransport::new(Some(primary), Some(secondary.clone()));

        let result = auto.send(&request()).await;
        assert_eq!(result.transport_used, TransportUsed::None);
        assert!(result.error_message().contains("primary: slow down"));
        assert!(result.error_message().contains("secondary: slow down"));
        assert!(result.fallback);
        assert!(!result.is_retryable());
        assert!(secondary.invalidated.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_primary_failure_without_secondary_keeps_category() {
        let primary = FakeTransport::new(
            TransportKind::Primary,
            true,
            rate_limited(TransportKind::Primary),
        );
        let secondary =
            FakeTransport::new(TransportKind::Secondary, false, ok(TransportKind::Secondary));

        for auto in [
            AutoTransport::new(Some(primary.clone()), None),
            AutoTransport::new(Some(primary.clone()), Some(secondary.clone())),
        ] {
            let result = auto.send(&request()).await;
            assert_eq!(result.error_type(), Some(ErrorType::RateLimit));
            assert!(result.is_retryable());
            assert_eq!(result.transport_used, TransportUsed::Primary);
            assert!(!result.fallback);
        }
        assert_eq!(secondary.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_secondary_failure_after_unavailable_primary_is_fallback() {
        let primary = FakeTransport::new(TransportKind::Primary, false, ok(TransportKind::Primary));
        let secondary = FakeTransport::new(
            TransportKind::Secondary,
            true,
            TransportResult::error(ErrorType::Auth, "not logged in", 3, TransportKind::Secondary),
        );
        let auto = AutoTransport::new(Some(primary), Some(secondary.clone()));

        let result = auto.send(&request()).await;
        assert_eq!(result.error_type(), Some(ErrorType::Auth));
        assert_eq!(result.transport_used, TransportUsed::Secondary);
        assert!(result.fallback);
        assert!(secondary.invalidated.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_primary_only_keeps_error_category() {
        let primary = FakeTransport::new(
            TransportKind::Primary,
            true,
            rate_limited(TransportKind::Primary),
        );
        let secondary =
            FakeTransport::new(TransportKind::Secondary, true, ok(TransportKind::Secondary));
        let auto = AutoTransport::new(Some(primary), Some(secondary.clone()))
            .with_preference(TransportPreference::Primary);

        let result = auto.send(&request()).await;
        assert_eq!(result.error_type(), Some(ErrorType::RateLimit));
        assert!(result.is_retryable());
        assert_eq!(secondary.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_secondary_only_not_flagged_fallback() {
        let auto = AutoTransport::new(
            None,
            Some(FakeTransport::new(
                TransportKind::Secondary,
                true,
                ok(TransportKind::Secondary),
            )),
        )
        .with_preference(TransportPreference::Secondary);

        let result = auto.send(&request()).await;
        assert!(result.is_ok());
        assert_eq!(result.transport_used, TransportUsed::Secondary);
        assert!(!result.fallback);
    }

    #[tokio::test]
    async fn test_missing_channel_unreachable() {
        let auto = AutoTransport::new(None, None).with_preference(TransportPreference::Primary);
        let result = auto.send(&request()).await;
        assert_eq!(result.transport_used, TransportUsed::None);
        assert!(result.error_message().contains("not configured"));
    }
}
