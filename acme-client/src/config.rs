//! Tunables for the nonce pool, rate limiter and polling loops.

use std::time::Duration;

use acme_http::HttpOptions;

/// Configuration of the [`NoncePool`](crate::NoncePool).
#[derive(Clone, Debug)]
pub struct NonceConfig {
    /// Hard cap on pooled nonces per namespace; the oldest entry is evicted beyond this.
    pub max_pool: usize,

    /// When a `get` leaves fewer than this many nonces behind, a background refill starts.
    pub prefetch_low_water: usize,

    /// A refill keeps fetching until the pool holds this many nonces.
    pub prefetch_high_water: usize,

    /// Nonces older than this are discarded instead of handed out.
    pub max_age: Duration,

    /// How long a `get` may wait for a refill before failing with a timeout.
    pub waiter_timeout: Duration,
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            max_pool: 32,
            prefetch_low_water: 5,
            prefetch_high_water: 10,
            max_age: Duration::from_millis(120_000),
            waiter_timeout: Duration::from_millis(30_000),
        }
    }
}

/// Configuration of the [`RateLimiter`](crate::RateLimiter).
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    /// Retries after the initial attempt before giving up.
    pub max_retries: u32,

    /// First backoff delay; doubles per attempt.
    pub base_delay: Duration,

    /// Upper bound for the computed backoff delay.
    pub max_delay: Duration,

    /// Honor `Retry-After` from 429/503 responses instead of the computed backoff.
    pub respect_retry_after: bool,

    /// Minimum spacing between any two requests leaving this client.
    pub min_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(300_000),
            respect_retry_after: true,
            min_interval: Duration::from_millis(100),
        }
    }
}

/// Polling parameters for orders and authorizations.
#[derive(Clone, Debug)]
pub struct OrderPollConfig {
    /// Pause between two polls of the same resource.
    pub interval: Duration,

    /// Polls before [`Error::OrderTimeout`](crate::Error::OrderTimeout) is raised.
    pub max_attempts: u32,
}

impl Default for OrderPollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(3000),
            max_attempts: 60,
        }
    }
}

/// All knobs of a [`Client`](crate::Client) in one place.
#[derive(Clone, Default)]
pub struct ClientConfig {
    /// Nonce pool behavior.
    pub nonce: NonceConfig,

    /// Retry/backoff behavior.
    pub rate: RateLimitConfig,

    /// Order/authorization polling behavior.
    pub order: OrderPollConfig,

    /// Transport options (user agent, timeouts, keepalive).
    pub http: HttpOptions,
}
