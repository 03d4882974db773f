//! The anti-replay nonce pool.
//!
//! Every signed ACME request consumes one `Replay-Nonce`. The pool keeps a small LIFO stock
//! per namespace (CA URL, extended with the account kid once one is assigned), refills it in a
//! single-flight background task, reclaims nonces from every observed response and retries
//! requests which the server rejected with `badNonce`.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::future::BoxFuture;
use tokio::sync::oneshot;

use acme_core::Problem;
use acme_http::Response;

use crate::config::NonceConfig;
use crate::error::Error;

/// Source of fresh nonces for the pool's refill task.
///
/// The production implementation performs a rate-limited `HEAD` on the directory's `newNonce`
/// URL; tests substitute their own.
pub trait NonceFetcher: Send + Sync + 'static {
    /// Fetch one fresh nonce.
    fn fetch_nonce<'a>(&'a self, new_nonce_url: &'a str) -> BoxFuture<'a, Result<String, Error>>;
}

struct Entry {
    value: String,
    acquired_at: Instant,
}

type Waiter = oneshot::Sender<Result<String, Error>>;

#[derive(Default)]
struct Namespace {
    /// LIFO stack: the freshest nonce sits at the back.
    entries: Vec<Entry>,
    /// FIFO queue of suspended `get` calls.
    waiters: VecDeque<Waiter>,
    /// Single-flight marker for the refill task.
    refilling: bool,
    /// Bumped by `clear` so an in-flight refill task stops touching the namespace.
    epoch: u64,
}

impl Namespace {
    fn discard_expired(&mut self, config: &NonceConfig) {
        let now = Instant::now();
        self.entries
            .retain(|entry| now.duration_since(entry.acquired_at) <= config.max_age);
    }

    /// Push a nonce, ignoring duplicates and evicting the oldest entry past the cap, then
    /// hand out entries to waiters, newest first.
    fn insert(&mut self, value: String, config: &NonceConfig) {
        if self.entries.iter().any(|entry| entry.value == value) {
            return;
        }
        self.entries.push(Entry {
            value,
            acquired_at: Instant::now(),
        });
        if self.entries.len() > config.max_pool {
            self.entries.remove(0);
        }
        self.drain_waiters();
    }

    fn drain_waiters(&mut self) {
        while !self.waiters.is_empty() && !self.entries.is_empty() {
            let entry = self.entries.pop().expect("checked non-empty");
            let waiter = self.waiters.pop_front().expect("checked non-empty");
            if let Err(unclaimed) = waiter.send(Ok(entry.value)) {
                // receiver gave up (timeout or cancellation), keep the nonce
                if let Ok(value) = unclaimed {
                    self.entries.push(Entry {
                        value,
                        acquired_at: entry.acquired_at,
                    });
                }
            }
        }
    }

    fn reject_waiters(&mut self, err: &Error) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(err.clone()));
        }
    }
}

struct PoolInner {
    fetcher: Arc<dyn NonceFetcher>,
    config: NonceConfig,
    namespaces: Mutex<HashMap<String, Namespace>>,
}

/// Point-in-time counters of one namespace, see [`NoncePool::stats`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NonceStats {
    /// Number of non-expired pooled nonces.
    pub pool_size: usize,
    /// Whether a refill task is currently running.
    pub refilling: bool,
}

/// A namespaced pool of `Replay-Nonce` values.
///
/// Cloning is cheap and clones share the pool.
#[derive(Clone)]
pub struct NoncePool {
    inner: Arc<PoolInner>,
}

impl NoncePool {
    /// Create a pool on top of a nonce source.
    pub fn new(fetcher: Arc<dyn NonceFetcher>, config: NonceConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                fetcher,
                config,
                namespaces: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Take a fresh nonce for `namespace`.
    ///
    /// Returns immediately when the pool has stock; otherwise the call suspends until the
    /// background refill (started on demand, one per namespace) produces one, the refill
    /// fails, or the waiter timeout elapses.
    pub async fn get(&self, namespace: &str, new_nonce_url: &str) -> Result<String, Error> {
        let rx = {
            let mut namespaces = self.inner.namespaces.lock().unwrap();
            let ns = namespaces.entry(namespace.to_string()).or_default();
            ns.discard_expired(&self.inner.config);

            if let Some(entry) = ns.entries.pop() {
                let start_refill =
                    ns.entries.len() < self.inner.config.prefetch_low_water && !ns.refilling;
                if start_refill {
                    ns.refilling = true;
                    let epoch = ns.epoch;
                    drop(namespaces);
                    self.spawn_refill(namespace, new_nonce_url, epoch);
                }
                return Ok(entry.value);
            }

            let (tx, rx) = oneshot::channel();
            ns.waiters.push_back(tx);
            if !ns.refilling {
                ns.refilling = true;
                let epoch = ns.epoch;
                drop(namespaces);
                self.spawn_refill(namespace, new_nonce_url, epoch);
            }
            rx
        };

        match tokio::time::timeout(self.inner.config.waiter_timeout, rx).await {
            Ok(Ok(result)) => result,
            // the pool (and with it all senders) went away
            Ok(Err(_)) => Err(Error::Cancelled("nonce pool shut down".to_string())),
            Err(_) => Err(Error::NonceTimeout {
                timeout: self.inner.config.waiter_timeout,
            }),
        }
    }

    /// Feed the `Replay-Nonce` of a response back into the pool.
    pub fn observe(&self, namespace: &str, response: &Response) {
        if let Some(nonce) = response.replay_nonce() {
            let mut namespaces = self.inner.namespaces.lock().unwrap();
            let ns = namespaces.entry(namespace.to_string()).or_default();
            ns.insert(nonce.to_string(), &self.inner.config);
        }
    }

    /// Drop one namespace's stock and reject its pending waiters with a cleanup error.
    pub fn clear(&self, namespace: &str) {
        let mut namespaces = self.inner.namespaces.lock().unwrap();
        if let Some(ns) = namespaces.get_mut(namespace) {
            ns.epoch += 1;
            ns.entries.clear();
            ns.reject_waiters(&Error::Cancelled("nonce pool cleared".to_string()));
        }
    }

    /// Drop all namespaces, rejecting every pending waiter.
    pub fn clear_all(&self) {
        let mut namespaces = self.inner.namespaces.lock().unwrap();
        for ns in namespaces.values_mut() {
            ns.epoch += 1;
            ns.entries.clear();
            ns.reject_waiters(&Error::Cancelled("nonce pool cleared".to_string()));
        }
    }

    /// Counters for one namespace.
    pub fn stats(&self, namespace: &str) -> NonceStats {
        let mut namespaces = self.inner.namespaces.lock().unwrap();
        match namespaces.get_mut(namespace) {
            Some(ns) => {
                ns.discard_expired(&self.inner.config);
                NonceStats {
                    pool_size: ns.entries.len(),
                    refilling: ns.refilling,
                }
            }
            None => NonceStats::default(),
        }
    }

    /// Run `op` with a fresh nonce, feeding every response back into the pool and retrying
    /// with a new nonce while the server answers `badNonce`, at most `max_attempts` times in
    /// total. Any other response, success or not, is returned to the caller unchanged.
    pub async fn with_nonce_retry<F, Fut>(
        &self,
        namespace: &str,
        new_nonce_url: &str,
        max_attempts: u32,
        mut op: F,
    ) -> Result<Response, Error>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<Response, Error>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let nonce = self.get(namespace, new_nonce_url).await?;
            let response = op(nonce).await?;
            self.observe(namespace, &response);

            if response.status < 400 {
                return Ok(response);
            }

            if attempt < max_attempts && response.is_problem() {
                if let Ok(problem) = response.json::<Problem>() {
                    if problem.is_bad_nonce() {
                        tracing::debug!(namespace, attempt, "retrying after badNonce");
                        continue;
                    }
                }
            }

            return Ok(response);
        }
    }

    fn spawn_refill(&self, namespace: &str, new_nonce_url: &str, epoch: u64) {
        let inner = Arc::clone(&self.inner);
        let namespace = namespace.to_string();
        let new_nonce_url = new_nonce_url.to_string();
        tokio::spawn(async move {
            // reset the single-flight marker on every exit, cancellation included
            let _guard = RefillGuard {
                inner: &inner,
                namespace: &namespace,
            };

            loop {
                {
                    let mut namespaces = inner.namespaces.lock().unwrap();
                    let ns = match namespaces.get_mut(&namespace) {
                        Some(ns) if ns.epoch == epoch => ns,
                        // cleared or gone, stop touching it
                        _ => return,
                    };
                    ns.discard_expired(&inner.config);
                    let stocked = ns.entries.len() >= inner.config.prefetch_high_water
                        || (ns.waiters.is_empty()
                            && ns.entries.len() >= inner.config.prefetch_low_water);
                    if stocked {
                        return;
                    }
                }

                match inner.fetcher.fetch_nonce(&new_nonce_url).await {
                    Ok(nonce) => {
                        let mut namespaces = inner.namespaces.lock().unwrap();
                        let ns = match namespaces.get_mut(&namespace) {
                            Some(ns) if ns.epoch == epoch => ns,
                            _ => return,
                        };
                        ns.insert(nonce, &inner.config);
                    }
                    Err(err) => {
                        tracing::warn!(namespace = %namespace, "nonce refill failed: {}", err);
                        let mut namespaces = inner.namespaces.lock().unwrap();
                        if let Some(ns) = namespaces.get_mut(&namespace) {
                            ns.reject_waiters(&err);
                        }
                        return;
                    }
                }
            }
        });
    }
}

struct RefillGuard<'a> {
    inner: &'a PoolInner,
    namespace: &'a str,
}

impl Drop for RefillGuard<'_> {
    fn drop(&mut self) {
        let mut namespaces = self.inner.namespaces.lock().unwrap();
        if let Some(ns) = namespaces.get_mut(self.namespace) {
            ns.refilling = false;
        }
    }
}
