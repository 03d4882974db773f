//! Retry and request-spacing policy.
//!
//! One limiter instance guards all traffic of a [`Client`](crate::Client): a global minimum
//! interval between requests, a per-endpoint block recorded from `Retry-After` answers, and
//! exponential backoff with jitter for transient failures. Callers which arrive while an
//! endpoint is blocked queue up on the endpoint's gate, so a recorded block schedules a single
//! wakeup instead of one timer per caller.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::error::Error;

/// HTTP statuses which are worth retrying after a pause.
const RETRYABLE_STATUS: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Message fragments that identify a retryable network failure.
const RETRYABLE_TRANSPORT: [&str; 7] = [
    "connection reset",
    "connection refused",
    "connection closed",
    "dns error",
    "failed to lookup",
    "timed out",
    "socket",
];

struct EndpointGate {
    /// `Some(deadline)` while the endpoint is blocked by a `Retry-After` answer. The first
    /// caller through the mutex sleeps until the deadline and clears it; everyone else just
    /// queues on the lock.
    blocked_until: Mutex<Option<Instant>>,
}

/// Exponential-backoff retry executor with `Retry-After` support.
pub struct RateLimiter {
    config: RateLimitConfig,
    endpoints: StdMutex<HashMap<String, Arc<EndpointGate>>>,
    /// Timestamp of the last request leaving this client, for the global minimum interval.
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter with the given policy.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            endpoints: StdMutex::new(HashMap::new()),
            last_request: Mutex::new(None),
        }
    }

    /// Run `op` until it succeeds, fails in a non-retryable way, or the retry budget is spent.
    ///
    /// `endpoint` keys the `Retry-After` bookkeeping; requests to the same endpoint share
    /// recorded blocks. Exhaustion raises [`Error::RateLimitExceeded`].
    pub async fn execute_with_retry<T, F, Fut>(&self, endpoint: &str, mut op: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut attempt: u32 = 0;
        let mut last_retry_after = None;

        loop {
            attempt += 1;

            self.wait_for_endpoint(endpoint).await;
            self.enforce_min_interval().await;

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !is_retryable(&err) {
                return Err(err);
            }

            let retry_after = err.retry_after_hint();
            if retry_after.is_some() {
                last_retry_after = retry_after;
            }

            if self.config.respect_retry_after
                && matches!(err.http_status(), Some(429) | Some(503))
            {
                if let Some(secs) = retry_after {
                    self.record_block(endpoint, Duration::from_secs(secs)).await;
                }
            }

            if attempt > self.config.max_retries {
                tracing::warn!(endpoint, attempts = attempt, "retries exhausted: {}", err);
                return Err(Error::RateLimitExceeded {
                    endpoint: endpoint.to_string(),
                    attempts: attempt,
                    retry_after: last_retry_after,
                });
            }

            let delay = match retry_after {
                Some(secs) if self.config.respect_retry_after => Duration::from_secs(secs),
                _ => self.backoff_delay(attempt),
            };
            tracing::debug!(
                endpoint,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying after transient failure: {}",
                err
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Record that `endpoint` must not be contacted for `duration`.
    pub async fn record_block(&self, endpoint: &str, duration: Duration) {
        let gate = self.gate(endpoint);
        let mut blocked = gate.blocked_until.lock().await;
        let deadline = Instant::now() + duration;
        *blocked = Some(match *blocked {
            Some(existing) if existing > deadline => existing,
            _ => deadline,
        });
    }

    async fn wait_for_endpoint(&self, endpoint: &str) {
        let gate = self.gate(endpoint);
        let mut blocked = gate.blocked_until.lock().await;
        if let Some(deadline) = *blocked {
            if deadline > Instant::now() {
                tracing::debug!(endpoint, "endpoint blocked, waiting for Retry-After window");
                tokio::time::sleep_until(deadline).await;
            }
            *blocked = None;
        }
    }

    async fn enforce_min_interval(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let next = prev + self.config.min_interval;
            if next > Instant::now() {
                tokio::time::sleep_until(next).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn gate(&self, endpoint: &str) -> Arc<EndpointGate> {
        let mut endpoints = self.endpoints.lock().unwrap();
        Arc::clone(endpoints.entry(endpoint.to_string()).or_insert_with(|| {
            Arc::new(EndpointGate {
                blocked_until: Mutex::new(None),
            })
        }))
    }

    /// `min(max_delay, base * 2^(attempt-1))`, scaled by a random factor in [0.75, 1.25).
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay.as_millis() as u64;
        let exp = base.saturating_mul(1u64 << (attempt - 1).min(20));
        let capped = exp.min(self.config.max_delay.as_millis() as u64);
        let jittered = capped / 4 * 3 + jitter(capped / 2);
        Duration::from_millis(jittered.min(self.config.max_delay.as_millis() as u64))
    }
}

/// Uniform random value in `[0, bound]`, from the openssl RNG.
fn jitter(bound: u64) -> u64 {
    if bound == 0 {
        return 0;
    }
    let mut buf = [0u8; 8];
    if openssl::rand::rand_bytes(&mut buf).is_err() {
        return bound / 2;
    }
    u64::from_le_bytes(buf) % (bound + 1)
}

/// Classify a failure per the retry policy: transient network failures, retryable HTTP
/// statuses, and servers that signal rate limiting textually.
pub(crate) fn is_retryable(err: &Error) -> bool {
    if matches!(
        err,
        Error::Acme {
            kind: acme_core::ProblemKind::RateLimited { .. },
            ..
        }
    ) {
        return true;
    }

    if let Some(status) = err.http_status() {
        return RETRYABLE_STATUS.contains(&status);
    }

    match err {
        Error::Transport { message } => {
            let message = message.to_ascii_lowercase();
            RETRYABLE_TRANSPORT
                .iter()
                .any(|fragment| message.contains(fragment))
        }
        _ => {
            let message = err.to_string().to_ascii_lowercase();
            message.contains("rate limit") || message.contains("too many")
        }
    }
}

/// Parse a `Retry-After` value: either a number of seconds or an HTTP/RFC 3339 date.
pub(crate) fn parse_retry_after(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(secs);
    }

    let when = chrono::DateTime::parse_from_rfc2822(value)
        .map(|t| t.with_timezone(&chrono::Utc))
        .or_else(|_| chrono::DateTime::parse_from_rfc3339(value).map(|t| t.with_timezone(&chrono::Utc)))
        .ok()?;

    let delta = when - chrono::Utc::now();
    Some(delta.num_seconds().max(0) as u64)
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use crate::config::RateLimitConfig;
    use crate::error::Error;

    use super::{parse_retry_after, RateLimiter};

    fn quick_config() -> RateLimitConfig {
        RateLimitConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(50),
            respect_retry_after: true,
            min_interval: Duration::from_millis(1),
        }
    }

    fn transient(status: u16) -> Error {
        Error::HttpStatus {
            url: "https://ca.example/x".to_string(),
            status,
            retry_after: None,
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let limiter = RateLimiter::new(quick_config());
        let calls = AtomicU32::new(0);

        let result = limiter
            .execute_with_retry("newNonce", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(transient(503))
                    } else {
                        Ok("nonce")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "nonce");
        // two 503s, success on the third attempt
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let limiter = RateLimiter::new(quick_config());
        let calls = AtomicU32::new(0);

        let err = limiter
            .execute_with_retry("newOrder", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(transient(500)) }
            })
            .await
            .unwrap_err();

        // initial attempt + max_retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match err {
            Error::RateLimitExceeded {
                endpoint, attempts, ..
            } => {
                assert_eq!(endpoint, "newOrder");
                assert_eq!(attempts, 4);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn non_retryable_errors_pass_through() {
        let limiter = RateLimiter::new(quick_config());
        let calls = AtomicU32::new(0);

        let err = limiter
            .execute_with_retry("acct", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(transient(403)) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, Error::HttpStatus { status: 403, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_blocks_subsequent_requests() {
        let limiter = RateLimiter::new(RateLimitConfig {
            min_interval: Duration::ZERO,
            ..quick_config()
        });

        limiter.record_block("order", Duration::from_secs(7)).await;

        let started = tokio::time::Instant::now();
        limiter
            .execute_with_retry("order", || async { Ok(()) })
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_secs(7));

        // other endpoints are unaffected
        let started = tokio::time::Instant::now();
        limiter
            .execute_with_retry("authz", || async { Ok(()) })
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn min_interval_spaces_requests() {
        let limiter = RateLimiter::new(RateLimitConfig {
            min_interval: Duration::from_millis(100),
            ..quick_config()
        });

        let started = tokio::time::Instant::now();
        for _ in 0..3 {
            limiter
                .execute_with_retry("any", || async { Ok(()) })
                .await
                .unwrap();
        }
        // 3 requests, 2 enforced gaps
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn transport_classification() {
        assert!(super::is_retryable(&Error::Transport {
            message: "error trying to connect: Connection refused (os error 111)".to_string()
        }));
        assert!(super::is_retryable(&Error::Transport {
            message: "request to https://x timed out after 30s".to_string()
        }));
        assert!(!super::is_retryable(&Error::Transport {
            message: "invalid json response body".to_string()
        }));
        assert!(!super::is_retryable(&Error::Cancelled("cleanup".to_string())));
        // textual rate limit signals without a status
        assert!(super::is_retryable(&Error::InvalidApi(
            "please slow down, too many requests".to_string()
        )));
    }

    #[test]
    fn parses_retry_after_formats() {
        assert_eq!(parse_retry_after("17"), Some(17));
        assert_eq!(parse_retry_after("  0 "), Some(0));
        assert_eq!(parse_retry_after("not a date"), None);

        let future = chrono::Utc::now() + chrono::Duration::seconds(120);
        let secs = parse_retry_after(&future.to_rfc2822()).unwrap();
        assert!((110..=120).contains(&secs), "got {}", secs);

        let secs = parse_retry_after(&future.to_rfc3339()).unwrap();
        assert!((110..=120).contains(&secs), "got {}", secs);

        // dates in the past clamp to zero
        let past = chrono::Utc::now() - chrono::Duration::seconds(60);
        assert_eq!(parse_retry_after(&past.to_rfc2822()), Some(0));
    }
}
