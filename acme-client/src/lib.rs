//! Asynchronous ACME (RFC 8555) client engine.
//!
//! This crate drives the protocol flows on top of the primitives from `acme-core` and the
//! transport from `acme-http`: it manages anti-replay nonces in a prefetching [`NoncePool`],
//! spaces and retries requests through a [`RateLimiter`], signs everything with the
//! [`Account`] key, and walks orders, authorizations and challenges through their state
//! machines until a certificate chain can be downloaded.
//!
//! The usual flow:
//!
//! ```no_run
//! use acme_client::{Account, ChallengeRecord, Client};
//! use acme_core::csr::{Csr, CsrOptions};
//!
//! # async fn run() -> Result<(), acme_client::Error> {
//! let client = Client::new("https://acme-staging-v02.api.letsencrypt.org/directory");
//!
//! let account = Account::builder()
//!     .email("admin@example.com".to_string())
//!     .agree_to_tos(true)
//!     .build()?;
//! client.ensure_registered(&account).await?;
//!
//! let identifiers = vec!["example.com".to_string(), "*.example.com".to_string()];
//! let order = client.create_order(&account, identifiers.clone()).await?;
//!
//! let order = client
//!     .solve_dns01(
//!         &account,
//!         &order,
//!         |record: ChallengeRecord| async move {
//!             // publish record.value as a TXT record at record.target
//!             Ok(())
//!         },
//!         |_record: ChallengeRecord| async move {
//!             // block until authoritative servers answer the query
//!             Ok(())
//!         },
//!     )
//!     .await?;
//!
//! let csr = Csr::generate(&identifiers, CsrOptions::default())?;
//! let order = client.finalize(&account, &order, &csr.der_b64u).await?;
//! let order = client
//!     .wait_order(&account, &order, &[acme_core::order::Status::Valid])
//!     .await?;
//! let pem_chain = client.download_certificate(&account, &order).await?;
//! # let _ = pem_chain;
//! # Ok(())
//! # }
//! ```
//!
//! Everything that talks to the outside world beyond the CA itself (publishing DNS records,
//! serving http-01 files) stays with the caller via the `provision`/`wait_for` hooks.

mod account;
mod challenge;
mod client;
mod config;
mod error;
mod nonce;
mod order;
mod rate_limit;

pub use account::{Account, AccountBuilder};
pub use challenge::ChallengeRecord;
pub use client::Client;
pub use config::{ClientConfig, NonceConfig, OrderPollConfig, RateLimitConfig};
pub use error::Error;
pub use nonce::{NonceFetcher, NoncePool, NonceStats};
pub use rate_limit::RateLimiter;

#[doc(inline)]
pub use acme_core::{Authorization, Challenge, Directory, Identifier, Order, Problem, ProblemKind};
