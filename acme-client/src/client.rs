//! The client: directory cache, the authenticated request pipeline, account registration and
//! the order/certificate operations.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::json;
use tokio::sync::OnceCell;

use acme_core::account::AccountData;
use acme_core::order::OrderData;
use acme_core::{Directory, Order, PEM_CERTIFICATE_CHAIN};
use acme_http::{HttpClient, Response};

use crate::account::Account;
use crate::config::ClientConfig;
use crate::error::Error;
use crate::nonce::{NonceFetcher, NoncePool};
use crate::rate_limit::RateLimiter;

/// How often a request hitting `badNonce` is re-signed with a fresh nonce before giving up.
const BAD_NONCE_ATTEMPTS: u32 = 3;

/// An ACME client bound to one CA directory.
///
/// The client owns the directory cache, the HTTP transport, the [`NoncePool`] and the
/// [`RateLimiter`]; accounts are owned by the caller and borrowed per operation. Multiple
/// clients coexist without sharing any state.
pub struct Client {
    http: Arc<HttpClient>,
    rate_limiter: Arc<RateLimiter>,
    nonce_pool: NoncePool,
    directory_url: String,
    directory: OnceCell<Directory>,
    config: ClientConfig,
}

impl Client {
    /// Create a client for the given directory URL with default configuration.
    pub fn new(directory_url: impl Into<String>) -> Self {
        Self::with_config(directory_url, ClientConfig::default())
    }

    /// Create a client with explicit configuration.
    pub fn with_config(directory_url: impl Into<String>, config: ClientConfig) -> Self {
        let http = Arc::new(HttpClient::with_options(config.http.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate.clone()));
        let nonce_pool = NoncePool::new(
            Arc::new(HeadNonceFetcher {
                http: Arc::clone(&http),
                rate_limiter: Arc::clone(&rate_limiter),
            }),
            config.nonce.clone(),
        );

        Self {
            http,
            rate_limiter,
            nonce_pool,
            directory_url: directory_url.into(),
            directory: OnceCell::new(),
            config,
        }
    }

    /// The directory URL this client talks to.
    pub fn directory_url(&self) -> &str {
        &self.directory_url
    }

    /// The client's nonce pool.
    pub fn nonce_pool(&self) -> &NoncePool {
        &self.nonce_pool
    }

    /// The client's rate limiter.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Polling configuration in effect.
    pub(crate) fn poll_config(&self) -> &crate::config::OrderPollConfig {
        &self.config.order
    }

    /// Get the directory, fetching and caching it on first use.
    pub async fn directory(&self) -> Result<&Directory, Error> {
        self.directory
            .get_or_try_init(|| async {
                let url = self.directory_url.clone();
                let response = self
                    .rate_limiter
                    .execute_with_retry(&url, || async {
                        let response = self.http.get(&self.directory_url, None).await?;
                        reject_transient(&self.directory_url, response)
                    })
                    .await?;

                if !response.is_success() {
                    return Err(Error::from_response(&self.directory_url, &response));
                }

                // a directory response may already carry our first nonce
                self.nonce_pool.observe(&self.directory_url, &response);

                tracing::info!(url = %self.directory_url, "fetched ACME directory");
                Ok(Directory::new(self.directory_url.clone(), response.json()?))
            })
            .await
    }

    /// Convenience method to get the ToS URL from the directory.
    pub async fn terms_of_service_url(&self) -> Result<Option<&str>, Error> {
        Ok(self.directory().await?.terms_of_service_url())
    }

    /// Register the account with the CA, or return the cached account URL.
    ///
    /// Idempotent per [`Account`] instance: concurrent and repeated calls yield the one `kid`
    /// and only the first call performs a `newAccount` POST.
    pub async fn ensure_registered(&self, account: &Account) -> Result<String, Error> {
        if let Some(kid) = account.kid() {
            return Ok(kid.to_string());
        }

        let _registration = account.registration.lock().await;
        // settled while we waited for the lock
        if let Some(kid) = account.kid() {
            return Ok(kid.to_string());
        }

        let directory = self.directory().await?;
        let url = directory.new_account_url().to_string();

        let external_account_binding = account
            .eab()
            .map(|eab| eab.bind(account.jwk(), &url))
            .transpose()?;

        let data = AccountData {
            contact: account.contacts().to_vec(),
            terms_of_service_agreed: if account.tos_agreed() { Some(true) } else { None },
            external_account_binding,
            ..Default::default()
        };

        let response = self
            .signed_post(account, &url, Some(&serde_json::to_value(&data).map_err(
                |err| Error::Protocol(err.to_string()),
            )?))
            .await?;

        if !response.is_success() {
            return Err(Error::from_response(&url, &response));
        }

        let kid = match response.location() {
            Some(location) => location.to_string(),
            // body fallback for providers which repeat the URL in the account object
            None => response
                .json::<serde_json::Value>()
                .ok()
                .and_then(|body| {
                    body.get("location")
                        .or_else(|| body.get("url"))
                        .and_then(|v| v.as_str())
                        .map(str::to_owned)
                })
                .ok_or(Error::MissingLocation { url: url.clone() })?,
        };

        tracing::info!(kid = %kid, "registered ACME account");
        account.store_kid(kid.clone());
        Ok(kid)
    }

    /// Update account data (e.g. the contact list) at the account URL.
    pub async fn update_account(
        &self,
        account: &Account,
        data: &serde_json::Value,
    ) -> Result<AccountData, Error> {
        let kid = self.ensure_registered(account).await?;
        let response = self.signed_post(account, &kid, Some(data)).await?;
        if !response.is_success() {
            return Err(Error::from_response(&kid, &response));
        }
        Ok(response.json()?)
    }

    /// Deactivate the account. This is final; the CA will refuse the key afterwards.
    pub async fn deactivate_account(&self, account: &Account) -> Result<(), Error> {
        let kid = self.ensure_registered(account).await?;
        let response = self
            .signed_post(account, &kid, Some(&json!({ "status": "deactivated" })))
            .await?;
        if !response.is_success() {
            return Err(Error::from_response(&kid, &response));
        }
        Ok(())
    }

    /// Revoke a certificate, given in PEM or DER form, with an optional RFC 5280 reason code.
    ///
    /// The request is authorized with the account key.
    pub async fn revoke_certificate(
        &self,
        account: &Account,
        certificate: &[u8],
        reason: Option<u32>,
    ) -> Result<(), Error> {
        let cert = if certificate.starts_with(b"-----BEGIN CERTIFICATE-----") {
            let der = openssl::x509::X509::from_pem(certificate)
                .and_then(|x509| x509.to_der())
                .map_err(|err| Error::Protocol(format!("unparsable certificate: {}", err)))?;
            acme_core::b64u_encode(&der)
        } else {
            acme_core::b64u_encode(certificate)
        };

        let data = match reason {
            Some(reason) => json!({ "certificate": cert, "reason": reason }),
            None => json!({ "certificate": cert }),
        };

        self.ensure_registered(account).await?;
        let url = self.directory().await?.revoke_cert_url().to_string();
        let response = self.signed_post(account, &url, Some(&data)).await?;
        if !response.is_success() {
            return Err(Error::from_response(&url, &response));
        }
        Ok(())
    }

    /// Place a new order for a set of DNS identifiers.
    pub async fn create_order(
        &self,
        account: &Account,
        domains: impl IntoIterator<Item = String>,
    ) -> Result<Order, Error> {
        let order = domains
            .into_iter()
            .fold(OrderData::new(), |order, domain| order.domain(domain));
        if order.identifiers.is_empty() {
            return Err(Error::Protocol("cannot order an empty identifier set".to_string()));
        }

        self.ensure_registered(account).await?;
        let url = self.directory().await?.new_order_url().to_string();

        let payload =
            serde_json::to_value(&order).map_err(|err| Error::Protocol(err.to_string()))?;
        let response = self.signed_post(account, &url, Some(&payload)).await?;

        if response.status != 201 {
            return Err(Error::from_response(&url, &response));
        }
        let location = response
            .location()
            .ok_or(Error::MissingLocation { url: url.clone() })?
            .to_string();

        tracing::info!(order = %location, "created order");
        Ok(Order {
            url: location,
            data: response.json()?,
        })
    }

    /// Fetch the current state of an order.
    pub async fn fetch_order(&self, account: &Account, order_url: &str) -> Result<Order, Error> {
        let response = self.post_as_get(account, order_url).await?;
        Ok(Order {
            url: order_url.to_string(),
            data: response.json()?,
        })
    }

    /// Authoritative read of a protected resource via POST-as-GET (signed POST with an empty
    /// payload). Non-2xx answers come back as typed errors.
    pub async fn post_as_get(&self, account: &Account, url: &str) -> Result<Response, Error> {
        let response = self.signed_request(account, url, None, None).await?;
        if !response.is_success() {
            return Err(Error::from_response(url, &response));
        }
        Ok(response)
    }

    /// Assuming the provided URL is an 'Authorization' URL, get and deserialize it.
    pub async fn get_authorization(
        &self,
        account: &Account,
        url: &str,
    ) -> Result<acme_core::Authorization, Error> {
        Ok(self.post_as_get(account, url).await?.json()?)
    }

    /// Signed POST with a JSON payload. Error statuses are returned as responses so callers
    /// can decide; transient statuses have already been retried by the rate limiter.
    pub(crate) async fn signed_post(
        &self,
        account: &Account,
        url: &str,
        payload: Option<&serde_json::Value>,
    ) -> Result<Response, Error> {
        self.signed_request(account, url, payload, None).await
    }

    /// The authenticated pipeline: fresh nonce, JWS, rate-limited POST, nonce reclaim and
    /// badNonce retry.
    pub(crate) async fn signed_request(
        &self,
        account: &Account,
        url: &str,
        payload: Option<&serde_json::Value>,
        accept: Option<&str>,
    ) -> Result<Response, Error> {
        let directory = self.directory().await?;
        let new_nonce_url = directory.new_nonce_url().to_string();
        let namespace = account.nonce_namespace(&self.directory_url);

        let extra_headers = accept.map(|accept| {
            let mut headers = HashMap::new();
            headers.insert("Accept".to_string(), accept.to_string());
            headers
        });

        self.nonce_pool
            .with_nonce_retry(&namespace, &new_nonce_url, BAD_NONCE_ATTEMPTS, |nonce| {
                let jws = account.sign(url, nonce, payload);
                let extra_headers = extra_headers.clone();
                async move {
                    let body = serde_json::to_string(&jws?)
                        .map_err(|err| Error::Protocol(err.to_string()))?;
                    self.rate_limiter
                        .execute_with_retry(url, || {
                            let body = body.clone();
                            let extra_headers = extra_headers.clone();
                            async move {
                                let response = self
                                    .http
                                    .post(
                                        url,
                                        Some(body),
                                        Some(acme_core::JOSE_JSON),
                                        extra_headers.as_ref(),
                                    )
                                    .await?;
                                reject_transient(url, response)
                            }
                        })
                        .await
                }
            })
            .await
    }

    /// Download the issued certificate chain of a `valid` order as PEM.
    pub async fn download_certificate(
        &self,
        account: &Account,
        order: &Order,
    ) -> Result<String, Error> {
        let url = order.data.certificate.as_deref().ok_or_else(|| {
            Error::InvalidApi("order carries no certificate URL yet".to_string())
        })?;

        let response = self
            .signed_request(account, url, None, Some(PEM_CERTIFICATE_CHAIN))
            .await?;
        if !response.is_success() {
            return Err(Error::from_response(url, &response));
        }

        match response.text() {
            Some(pem) => Ok(pem.to_string()),
            None => String::from_utf8(response.bytes())
                .map_err(|_| Error::InvalidApi("certificate chain is not valid utf-8".to_string())),
        }
    }
}

/// Map statuses which the rate limiter should retry into errors; everything else passes.
fn reject_transient(url: &str, response: Response) -> Result<Response, Error> {
    match response.status {
        408 | 429 | 500 | 502 | 503 | 504 => Err(Error::from_response(url, &response)),
        _ => Ok(response),
    }
}

/// The production nonce source: a rate-limited `HEAD` on the `newNonce` URL.
struct HeadNonceFetcher {
    http: Arc<HttpClient>,
    rate_limiter: Arc<RateLimiter>,
}

impl NonceFetcher for HeadNonceFetcher {
    fn fetch_nonce<'a>(&'a self, new_nonce_url: &'a str) -> BoxFuture<'a, Result<String, Error>> {
        async move {
            let response = self
                .rate_limiter
                .execute_with_retry(new_nonce_url, || async {
                    let response = self.http.head(new_nonce_url, None).await?;
                    reject_transient(new_nonce_url, response)
                })
                .await?;

            if !response.is_success() {
                return Err(Error::from_response(new_nonce_url, &response));
            }

            response
                .replay_nonce()
                .map(str::to_owned)
                .ok_or_else(|| Error::NonceNoHeader {
                    url: new_nonce_url.to_string(),
                })
        }
        .boxed()
    }
}
