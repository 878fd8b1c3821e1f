//! Cached availability checks
//!
//! Concurrent fan-out would otherwise check the same channel once per
//! provider. The cache serializes checks behind an async mutex, so callers
//! arriving while a check runs wait for its answer instead of checking again.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct Checked {
    at: Instant,
    available: bool,
}

/// TTL-cached answer of an availability check
#[derive(Debug)]
pub struct AvailabilityCache {
    ttl: Duration,
    availability_timeout: Duration,
    last: Mutex<Option<Checked>>,
    stale: AtomicBool,
}

impl AvailabilityCache {
    pub fn new(ttl: Duration, availability_timeout: Duration) -> Self {
        Self {
            ttl,
            availability_timeout,
            last: Mutex::new(None),
            stale: AtomicBool::new(false),
        }
    }

    pub fn availability_timeout(&self) -> Duration {
        self.availability_timeout
    }

    /// Cached answer if fresh, otherwise run `detect` bounded by the
    /// availability timeout. A check that times out counts as unavailable.
    pub async fn check<F, Fut>(&self, detect: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        let mut last = self.last.lock().await;
        let forced = self.stale.swap(false, Ordering::AcqRel);

        if !forced
            && let Some(checked) = *last
            && checked.at.elapsed() < self.ttl
        {
            return checked.available;
        }

        let available = tokio::time::timeout(self.availability_timeout, detect())
            .await
            .unwrap_or(false);
        debug!(available, forced, "Availability checked");
        *last = Some(Checked {
            at: Instant::now(),
            available,
        });
        available
    }

    /// Make the next `check` run `detect` regardless of freshness.
    pub fn invalidate(&self) {
        self.stale.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn counting_check(
        counter: &Arc<AtomicUsize>,
        result: bool,
    ) -> impl FnOnce() -> std::pin::Pin<Box<dyn Future<Output = bool> + Send>> {
        let counter = Arc::clone(counter);
        move || {
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                result
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_within_ttl() {
        let cache = AvailabilityCache::new(Duration::from_secs(5), Duration::from_secs(3));
        let checks = Arc::new(AtomicUsize::new(0));

        assert!(cache.check(counting_check(&checks, true)).await);
        assert!(cache.check(counting_check(&checks, false)).await);
        assert_eq!(checks.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!cache.check(counting_check(&checks, false)).await);
        assert_eq!(checks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_recheck() {
        let cache = AvailabilityCache::new(Duration::from_secs(5), Duration::from_secs(3));
        let checks = Arc::new(AtomicUsize::new(0));

        assert!(cache.check(counting_check(&checks, true)).await);
        cache.invalidate();
        assert!(!cache.check(counting_check(&checks, false)).await);
        assert_eq!(checks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_check_times_out_unavailable() {
        let cache = AvailabilityCache::new(Duration::from_secs(5), Duration::from_secs(3));
        let available = cache
            .check(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                true
            })
            .await;
        assert!(!available);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_check() {
        let cache = Arc::new(AvailabilityCache::new(
            Duration::from_secs(5),
            Duration::from_secs(3),
        ));
        let checks = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let cache = Arc::clone(&cache);
            let checks = Arc::clone(&checks);
            handles.push(tokio::spawn(async move {
                cache
                    .check(|| async move {
                        checks.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        true
                    })
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(checks.load(Ordering::SeqCst), 1);
    }
}
