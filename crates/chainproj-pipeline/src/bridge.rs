//! Resolver bridge — connects `Resolve` steps to the external content
//! resolver with memoization, backpressure, and capped-backoff retry.
//!
//! Memoization is a correctness requirement, not an optimization: entity
//! output must be identical no matter how many steps in one run ask for the
//! same reference, even against external stores that mutate under retried
//! queries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{OnceCell, Semaphore};

use chainproj_core::{ContentResolver, ResolveError, Value};

// ─── Retry policy ────────────────────────────────────────────────────────────

/// Configuration for resolution retries.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first try.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Cap on exponential growth.
    pub max_backoff: Duration,
    /// Backoff multiplier per retry.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before the retry following the `failed`-th failed attempt
    /// (1-based), or `None` when attempts are exhausted.
    pub fn delay_after(&self, failed: u32) -> Option<Duration> {
        if failed >= self.max_attempts {
            return None;
        }
        let base_ms = self.initial_backoff.as_millis() as f64
            * self.multiplier.powi(failed.saturating_sub(1) as i32);
        let capped = base_ms.min(self.max_backoff.as_millis() as f64);
        Some(Duration::from_millis(capped as u64))
    }
}

// ─── Per-run cache ───────────────────────────────────────────────────────────

/// Resolution cache owned by a single pipeline run.
///
/// One cell per reference: concurrent records asking for the same reference
/// wait on the same cell, so the external resolver is invoked at most once
/// per reference per run. Distinct references resolve independently.
#[derive(Default)]
pub struct RunCache {
    cells: Mutex<HashMap<String, Arc<OnceCell<Value>>>>,
}

impl RunCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, reference: &str) -> Arc<OnceCell<Value>> {
        let mut cells = self.cells.lock().unwrap();
        cells
            .entry(reference.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }
}

// ─── Bridge ──────────────────────────────────────────────────────────────────

/// The pipeline's gateway to the external content resolver.
///
/// Cloning is cheap; clones share the resolver, the concurrency limiter,
/// and the retry policy, but never a run cache.
#[derive(Clone)]
pub struct ResolverBridge {
    resolver: Arc<dyn ContentResolver>,
    retry: RetryConfig,
    limiter: Arc<Semaphore>,
    fan_out: usize,
}

impl ResolverBridge {
    pub fn new(resolver: Arc<dyn ContentResolver>) -> Self {
        Self {
            resolver,
            retry: RetryConfig::default(),
            limiter: Arc::new(Semaphore::new(8)),
            fan_out: 16,
        }
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Cap concurrent in-flight resolver calls. Pipeline workers suspend
    /// (not busy-wait) when the limit is reached.
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.limiter = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    /// Cap concurrent record evaluation within one pipeline run.
    pub fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out.max(1);
        self
    }

    pub fn fan_out(&self) -> usize {
        self.fan_out
    }

    /// Resolve through the run's cache. At most one external call per
    /// reference per run; cached hits return without touching the limiter.
    pub async fn resolve(
        &self,
        cache: &RunCache,
        reference: &str,
    ) -> Result<Value, ResolveError> {
        let cell = cache.cell(reference);
        cell.get_or_try_init(|| self.fetch(reference))
            .await
            .cloned()
    }

    /// One uncached fetch with bounded concurrency and retry.
    async fn fetch(&self, reference: &str) -> Result<Value, ResolveError> {
        let mut failed = 0u32;
        loop {
            let result = {
                // Semaphore never closes; acquire cannot fail.
                let _permit = self.limiter.acquire().await.expect("limiter closed");
                self.resolver.resolve(reference).await
            };
            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() => {
                    failed += 1;
                    match self.retry.delay_after(failed) {
                        Some(delay) => {
                            tracing::warn!(
                                reference,
                                attempt = failed,
                                delay_ms = delay.as_millis() as u64,
                                "Resolution failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            tracing::warn!(reference, attempts = failed, "Resolution gave up");
                            return Err(err);
                        }
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyResolver {
        fail_first: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ContentResolver for FlakyResolver {
        async fn resolve(&self, reference: &str) -> Result<Value, ResolveError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(ResolveError::Failed {
                    reference: reference.to_string(),
                    cause: "transient".into(),
                })
            } else {
                Ok(Value::from(reference))
            }
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            multiplier: 2.0,
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let cfg = RetryConfig {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            multiplier: 2.0,
        };
        assert_eq!(cfg.delay_after(1).unwrap().as_millis(), 100);
        assert_eq!(cfg.delay_after(2).unwrap().as_millis(), 200);
        assert_eq!(cfg.delay_after(3).unwrap().as_millis(), 400);
        assert_eq!(cfg.delay_after(4).unwrap().as_millis(), 500); // capped
        assert!(cfg.delay_after(10).is_none());
    }

    #[tokio::test]
    async fn retries_until_success() {
        let resolver = Arc::new(FlakyResolver {
            fail_first: 2,
            calls: AtomicU32::new(0),
        });
        let bridge = ResolverBridge::new(resolver.clone()).with_retry(fast_retry(4));
        let cache = RunCache::new();

        let value = bridge.resolve(&cache, "Qm1").await.unwrap();
        assert_eq!(value, Value::from("Qm1"));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn surfaces_failure_after_attempt_limit() {
        let resolver = Arc::new(FlakyResolver {
            fail_first: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let bridge = ResolverBridge::new(resolver.clone()).with_retry(fast_retry(3));
        let cache = RunCache::new();

        let err = bridge.resolve(&cache, "Qm1").await.unwrap_err();
        assert!(matches!(err, ResolveError::Failed { .. }));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn malformed_is_not_retried() {
        struct Malformed;
        #[async_trait]
        impl ContentResolver for Malformed {
            async fn resolve(&self, reference: &str) -> Result<Value, ResolveError> {
                Err(ResolveError::Malformed {
                    reference: reference.to_string(),
                    reason: "not json".into(),
                })
            }
        }
        let bridge = ResolverBridge::new(Arc::new(Malformed)).with_retry(fast_retry(5));
        let err = bridge.resolve(&RunCache::new(), "Qm1").await.unwrap_err();
        assert!(matches!(err, ResolveError::Malformed { .. }));
    }

    #[tokio::test]
    async fn cache_deduplicates_concurrent_requests() {
        struct Slow {
            calls: AtomicU32,
        }
        #[async_trait]
        impl ContentResolver for Slow {
            async fn resolve(&self, reference: &str) -> Result<Value, ResolveError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(Value::from(reference))
            }
        }
        let resolver = Arc::new(Slow {
            calls: AtomicU32::new(0),
        });
        let bridge = ResolverBridge::new(resolver.clone());
        let cache = RunCache::new();

        let (a, b) = tokio::join!(
            bridge.resolve(&cache, "Qm1"),
            bridge.resolve(&cache, "Qm1"),
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }
}
