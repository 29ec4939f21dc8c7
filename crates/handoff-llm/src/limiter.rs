//! Concurrency cap and token-bucket rate limit for generator calls.
//!
//! External collaborators are rate-limited, so the pipeline enforces a
//! per-collaborator in-flight cap and a request rate limit at this seam.
//! [`RateLimited`] wraps any [`Generator`]:
//!
//! 1. **Concurrency cap** -- a semaphore bounds simultaneous in-flight
//!    calls.
//! 2. **Token bucket** -- requests drain a bucket refilled at the
//!    configured rate; when the bucket is empty the caller waits for the
//!    next refill rather than failing.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::debug;

use crate::error::Result;
use crate::generator::Generator;
use crate::types::{GenerateRequest, GenerateResponse};

/// Limits applied to a wrapped generator.
#[derive(Debug, Clone)]
pub struct LimitConfig {
    /// Maximum simultaneous in-flight calls.
    pub max_concurrent: usize,
    /// Sustained request rate, per minute. 0 = unlimited.
    pub requests_per_minute: u32,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            requests_per_minute: 120,
        }
    }
}

/// Token-bucket state. Tokens are fractional so refill composes cleanly
/// with arbitrary elapsed intervals.
struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(requests_per_minute: u32) -> Self {
        let capacity = f64::from(requests_per_minute.max(1));
        Self {
            tokens: capacity,
            capacity,
            refill_per_sec: f64::from(requests_per_minute) / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Take one token, or return how long to wait until one is available.
    fn try_take(&mut self, now: Instant) -> Option<Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            let deficit = 1.0 - self.tokens;
            Some(Duration::from_secs_f64(deficit / self.refill_per_sec))
        }
    }
}

/// A generator wrapper enforcing a concurrency cap and a request rate.
pub struct RateLimited<G> {
    inner: G,
    semaphore: Arc<Semaphore>,
    bucket: Option<Mutex<Bucket>>,
}

impl<G: Generator> RateLimited<G> {
    /// Wrap a generator with the given limits.
    pub fn new(inner: G, config: LimitConfig) -> Self {
        let bucket = if config.requests_per_minute > 0 {
            Some(Mutex::new(Bucket::new(config.requests_per_minute)))
        } else {
            None
        };
        Self {
            inner,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            bucket,
        }
    }

    /// Wait until the token bucket grants a slot.
    async fn wait_for_token(&self) {
        let Some(bucket) = &self.bucket else {
            return;
        };
        loop {
            let wait = {
                let mut guard = bucket.lock().unwrap_or_else(|e| e.into_inner());
                guard.try_take(Instant::now())
            };
            match wait {
                None => return,
                Some(delay) => {
                    debug!(
                        generator = %self.inner.name(),
                        delay_ms = delay.as_millis() as u64,
                        "rate limit reached, waiting for bucket refill"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl<G: Generator> Generator for RateLimited<G> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| crate::error::GeneratorError::RequestFailed("limiter closed".into()))?;
        self.wait_for_token().await;
        self.inner.generate(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowGenerator {
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Generator for SlowGenerator {
        fn name(&self) -> &str {
            "slow"
        }

        async fn generate(&self, _req: &GenerateRequest) -> Result<GenerateResponse> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(GenerateResponse {
                text: "ok".into(),
                tokens_used: 1,
                model_confidence: None,
            })
        }
    }

    #[tokio::test]
    async fn concurrency_cap_enforced() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let limited = Arc::new(RateLimited::new(
            SlowGenerator {
                in_flight: in_flight.clone(),
                peak: peak.clone(),
            },
            LimitConfig {
                max_concurrent: 2,
                requests_per_minute: 0,
            },
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limited = limited.clone();
            handles.push(tokio::spawn(async move {
                limited
                    .generate(&GenerateRequest::new("x", "y"))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(
            peak.load(Ordering::SeqCst) <= 2,
            "peak concurrency {} exceeded cap",
            peak.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn bucket_grants_up_to_capacity_immediately() {
        let mut bucket = Bucket::new(60);
        let now = Instant::now();
        for _ in 0..60 {
            assert!(bucket.try_take(now).is_none());
        }
        // 61st request must wait ~1 second at 60 rpm.
        let wait = bucket.try_take(now).expect("bucket should be empty");
        assert!(wait > Duration::from_millis(500));
        assert!(wait <= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn bucket_refills_over_time() {
        let mut bucket = Bucket::new(60);
        let start = Instant::now();
        for _ in 0..60 {
            bucket.try_take(start);
        }
        // After 2 simulated seconds, ~2 tokens are back.
        let later = start + Duration::from_secs(2);
        assert!(bucket.try_take(later).is_none());
        assert!(bucket.try_take(later).is_none());
        assert!(bucket.try_take(later).is_some());
    }

    #[tokio::test]
    async fn unlimited_rate_skips_bucket() {
        let limited = RateLimited::new(
            SlowGenerator {
                in_flight: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
            },
            LimitConfig {
                max_concurrent: 4,
                requests_per_minute: 0,
            },
        );
        assert!(limited.bucket.is_none());
        limited
            .generate(&GenerateRequest::new("x", "y"))
            .await
            .unwrap();
    }
}
