//! Retry wrapper for generator calls.
//!
//! [`RetryPolicy`] re-issues a request after transient failures (rate
//! limits, timeouts, 5xx, network errors) and returns terminal failures
//! untouched. Waits follow an exponential schedule with *equal jitter*:
//! the lower half of each step is guaranteed, the upper half is scaled
//! by a fraction derived from the request nonce, so a retried request
//! always waits the same amount while different requests spread out
//! instead of thundering back in lockstep. The nonce also rides along
//! unchanged, keeping every attempt idempotent at the adapter.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{GeneratorError, Result};
use crate::generator::Generator;
use crate::types::{GenerateRequest, GenerateResponse};

/// Retry budget and delay bounds.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries allowed after the first failure (default: 3).
    pub max_retries: u32,
    /// First step of the exponential schedule (default: 500ms).
    pub base_delay: Duration,
    /// Ceiling for any single wait (default: 30 seconds).
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// The wait before retry number `failures` (1-based).
///
/// The full step for failure `n` is `base_delay * 2^(n-1)`, capped at
/// `max_delay`. The wait lands in `[step/2, step)`: half is fixed, the
/// rest is the nonce-keyed fraction of the other half.
fn backoff_wait(config: &RetryConfig, nonce: Uuid, failures: u32) -> Duration {
    let doubling = 1u32 << failures.saturating_sub(1).min(20);
    let step = config
        .base_delay
        .saturating_mul(doubling)
        .min(config.max_delay);
    let half = step / 2;
    half + half.mul_f64(spread(nonce, failures))
}

/// Deterministic fraction in `[0, 1)` keyed by nonce and attempt.
fn spread(nonce: Uuid, failures: u32) -> f64 {
    let mut hasher = DefaultHasher::new();
    nonce.hash(&mut hasher);
    failures.hash(&mut hasher);
    // Top 53 bits so the quotient is exact in an f64 mantissa.
    (hasher.finish() >> 11) as f64 / (1u64 << 53) as f64
}

/// A generator wrapper that absorbs transient failures.
///
/// ```rust,ignore
/// use handoff_llm::{OpenAiCompatGenerator, RetryPolicy, RetryConfig};
///
/// let generator = RetryPolicy::new(
///     OpenAiCompatGenerator::new(endpoint),
///     RetryConfig::default(),
/// );
/// ```
pub struct RetryPolicy<G> {
    inner: G,
    config: RetryConfig,
}

impl<G: Generator> RetryPolicy<G> {
    /// Wrap a generator with the given retry budget.
    pub fn new(inner: G, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// How long to pause before retry number `failures`. A rate-limited
    /// collaborator's own hint wins when it asks for more patience than
    /// the schedule would give.
    fn pause_before(&self, failures: u32, nonce: Uuid, err: &GeneratorError) -> Duration {
        let wait = backoff_wait(&self.config, nonce, failures);
        if let GeneratorError::RateLimited { retry_after_ms } = err {
            wait.max(Duration::from_millis(*retry_after_ms))
        } else {
            wait
        }
    }
}

#[async_trait]
impl<G: Generator> Generator for RetryPolicy<G> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let mut failures = 0u32;
        loop {
            let err = match self.inner.generate(request).await {
                Ok(response) => {
                    if failures > 0 {
                        debug!(
                            generator = %self.inner.name(),
                            failures,
                            "generation recovered"
                        );
                    }
                    return Ok(response);
                }
                Err(err) => err,
            };

            if !err.is_transient() {
                return Err(err);
            }
            failures += 1;
            if failures > self.config.max_retries {
                warn!(
                    generator = %self.inner.name(),
                    failures,
                    error = %err,
                    "retry budget spent"
                );
                return Err(err);
            }

            let wait = self.pause_before(failures, request.nonce, &err);
            debug!(
                generator = %self.inner.name(),
                failures,
                wait_ms = wait.as_millis() as u64,
                "pausing before retry"
            );
            tokio::time::sleep(wait).await;
        }
    }
}

impl<G: std::fmt::Debug> std::fmt::Debug for RetryPolicy<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("inner", &self.inner)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Pops one scripted error per call; answers once the script runs dry.
    struct FlakyGenerator {
        script: Mutex<VecDeque<GeneratorError>>,
        calls: AtomicU32,
    }

    impl FlakyGenerator {
        fn with_script(errors: Vec<GeneratorError>) -> Self {
            Self {
                script: Mutex::new(errors.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Generator for FlakyGenerator {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn generate(&self, _request: &GenerateRequest) -> Result<GenerateResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .script
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front();
            match next {
                Some(err) => Err(err),
                None => Ok(GenerateResponse {
                    text: "recovered".into(),
                    tokens_used: 7,
                    model_confidence: None,
                }),
            }
        }
    }

    fn tight_config() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(8),
        }
    }

    fn overloaded() -> GeneratorError {
        GeneratorError::RequestFailed("HTTP 502: upstream overloaded".into())
    }

    // ── Schedule shape ─────────────────────────────────────────────

    #[test]
    fn wait_lands_in_the_equal_jitter_band() {
        let config = RetryConfig {
            max_retries: 5,
            base_delay: Duration::from_millis(40),
            max_delay: Duration::from_secs(10),
        };
        let nonce = Uuid::new_v4();
        // Step for failure n is 40ms * 2^(n-1); the wait sits in
        // [step/2, step).
        for (failures, step_ms) in [(1u32, 40u128), (2, 80), (3, 160), (4, 320)] {
            let wait = backoff_wait(&config, nonce, failures).as_millis();
            assert!(
                wait >= step_ms / 2 && wait <= step_ms,
                "failure {failures}: wait {wait}ms outside [{}, {step_ms}]",
                step_ms / 2
            );
        }
    }

    #[test]
    fn ceiling_bounds_every_wait() {
        let config = RetryConfig {
            max_retries: 10,
            base_delay: Duration::from_millis(300),
            max_delay: Duration::from_millis(700),
        };
        let nonce = Uuid::new_v4();
        for failures in 1..=12 {
            let wait = backoff_wait(&config, nonce, failures);
            assert!(
                wait <= Duration::from_millis(700),
                "failure {failures}: wait {wait:?} above the ceiling"
            );
            assert!(wait >= Duration::from_millis(150));
        }
    }

    #[test]
    fn same_request_always_waits_the_same() {
        let config = RetryConfig::default();
        let nonce = Uuid::new_v4();
        for failures in 1..=4 {
            assert_eq!(
                backoff_wait(&config, nonce, failures),
                backoff_wait(&config, nonce, failures)
            );
        }
    }

    #[test]
    fn different_requests_spread_out() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(60),
        };
        let mut distinct = std::collections::HashSet::new();
        for _ in 0..32 {
            distinct.insert(backoff_wait(&config, Uuid::new_v4(), 1));
        }
        assert!(
            distinct.len() > 1,
            "32 nonces produced a single delay, jitter is not keyed"
        );
    }

    #[test]
    fn spread_stays_in_unit_interval() {
        for failures in 0..50 {
            let fraction = spread(Uuid::new_v4(), failures);
            assert!((0.0..1.0).contains(&fraction), "fraction {fraction}");
        }
    }

    #[test]
    fn rate_limit_hint_wins_when_longer() {
        let policy = RetryPolicy::new(
            FlakyGenerator::with_script(vec![]),
            tight_config(),
        );
        let nonce = Uuid::new_v4();
        let patient = policy.pause_before(
            1,
            nonce,
            &GeneratorError::RateLimited {
                retry_after_ms: 250,
            },
        );
        assert!(patient >= Duration::from_millis(250));

        // A hint shorter than the schedule does not shrink the wait.
        let hurried = policy.pause_before(
            3,
            nonce,
            &GeneratorError::RateLimited { retry_after_ms: 0 },
        );
        assert_eq!(hurried, backoff_wait(&policy.config, nonce, 3));
    }

    // ── Retry behavior ─────────────────────────────────────────────

    #[tokio::test]
    async fn absorbs_transient_hiccups() {
        let policy = RetryPolicy::new(
            FlakyGenerator::with_script(vec![overloaded(), GeneratorError::Timeout]),
            tight_config(),
        );
        let response = policy
            .generate(&GenerateRequest::new("balance?", "be brief"))
            .await
            .unwrap();
        assert_eq!(response.text, "recovered");
        assert_eq!(policy.inner.calls(), 3);
    }

    #[tokio::test]
    async fn spent_budget_surfaces_the_final_error() {
        let policy = RetryPolicy::new(
            FlakyGenerator::with_script(vec![
                overloaded(),
                overloaded(),
                GeneratorError::Timeout,
            ]),
            RetryConfig {
                max_retries: 2,
                ..tight_config()
            },
        );
        let err = policy
            .generate(&GenerateRequest::new("q", "s"))
            .await
            .unwrap_err();
        // The last error in the script is the one reported.
        assert!(matches!(err, GeneratorError::Timeout));
        // First call plus two retries, no more.
        assert_eq!(policy.inner.calls(), 3);
    }

    #[tokio::test]
    async fn terminal_failures_pass_straight_through() {
        let policy = RetryPolicy::new(
            FlakyGenerator::with_script(vec![GeneratorError::InvalidResponse(
                "no choices".into(),
            )]),
            tight_config(),
        );
        let err = policy
            .generate(&GenerateRequest::new("q", "s"))
            .await
            .unwrap_err();
        assert!(matches!(err, GeneratorError::InvalidResponse(_)));
        assert_eq!(policy.inner.calls(), 1);
    }

    #[tokio::test]
    async fn zero_budget_fails_on_first_transient() {
        let policy = RetryPolicy::new(
            FlakyGenerator::with_script(vec![GeneratorError::Timeout]),
            RetryConfig {
                max_retries: 0,
                ..tight_config()
            },
        );
        let err = policy
            .generate(&GenerateRequest::new("q", "s"))
            .await
            .unwrap_err();
        assert!(matches!(err, GeneratorError::Timeout));
        assert_eq!(policy.inner.calls(), 1);
    }

    #[tokio::test]
    async fn clean_first_call_needs_no_pause() {
        let policy = RetryPolicy::new(FlakyGenerator::with_script(vec![]), tight_config());
        let started = std::time::Instant::now();
        policy
            .generate(&GenerateRequest::new("q", "s"))
            .await
            .unwrap();
        assert_eq!(policy.inner.calls(), 1);
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn name_comes_from_the_wrapped_generator() {
        let policy = RetryPolicy::new(
            FlakyGenerator::with_script(vec![]),
            RetryConfig::default(),
        );
        assert_eq!(policy.name(), "flaky");
    }
}
