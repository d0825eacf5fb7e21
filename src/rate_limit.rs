// Rate limiting and retry for outbound HTTP calls.
//
// Both network capabilities (the Hugging Face datasets server and the Azure
// OpenAI interpreter) are unreliable, throttled services. RateLimiter spaces
// requests out to a fixed rate; with_retry re-runs an operation with
// exponential backoff and jitter when it fails with a transient error
// (429, 5xx, timeouts, dropped connections). Anything else fails immediately.

use std::sync::Arc;

use anyhow::Result;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::warn;

/// Spaces requests at least `interval` apart. Each caller reserves the next
/// free slot under the lock and sleeps outside it, so concurrent callers
/// queue up in arrival order.
#[derive(Clone)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Arc<Mutex<Option<Instant>>>,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64) -> Self {
        Self {
            interval: Duration::from_secs_f64(1.0 / requests_per_second.max(1e-3)),
            next_slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Wait for this caller's slot.
    pub async fn acquire(&self) {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = next.map_or(now, |at| at.max(now));
            *next = Some(slot + self.interval);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}

/// How persistently to retry transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further attempt
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Whether an error is worth retrying.
///
/// HTTP status failures are raised with "returned <status>" messages, so the
/// status is matched on the rendered chain. Transport errors are found by
/// downcasting to reqwest::Error.
pub fn is_transient(err: &anyhow::Error) -> bool {
    let transport = err.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .is_some_and(|e| e.is_timeout() || e.is_connect() || e.is_request())
    });
    if transport {
        return true;
    }

    let rendered = format!("{err:#}").to_lowercase();
    rendered.contains("returned 429")
        || rendered.contains("rate limit")
        || ["returned 500", "returned 502", "returned 503", "returned 504"]
            .iter()
            .any(|s| rendered.contains(s))
}

/// Retry with the default policy.
pub async fn with_retry<F, Fut, T>(rate_limiter: &RateLimiter, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    with_retry_policy(rate_limiter, RetryPolicy::default(), operation).await
}

/// Run `operation`, retrying transient failures with exponential backoff.
///
/// The rate limiter is acquired before every attempt, retries included.
pub async fn with_retry_policy<F, Fut, T>(
    rate_limiter: &RateLimiter,
    policy: RetryPolicy,
    operation: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0u32;

    loop {
        rate_limiter.acquire().await;

        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_transient(&err) || attempt >= policy.max_retries {
                    return Err(err);
                }
                attempt += 1;

                let backoff = policy
                    .base_backoff
                    .saturating_mul(1u32 << (attempt - 1))
                    .min(policy.max_backoff);
                // +/- 25% jitter so parallel callers don't retry in lockstep
                let jitter: f64 = rand::rng().random_range(0.75..1.25);
                let delay = backoff.mul_f64(jitter);

                warn!(
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
