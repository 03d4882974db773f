//! ACME protocol primitives.
//!
//! This crate implements the pieces of the ACME (RFC 8555) protocol which do not involve any
//! I/O: the wire-level resource types ([`Directory`], [`Order`], [`Authorization`],
//! [`Challenge`]), the flattened JWS signer used to authenticate requests ([`Jws`]), JWK
//! thumbprints and key authorizations ([`key`]), External Account Binding, PKCS#10 CSR
//! generation ([`Csr`]) and the RFC 7807 problem-document taxonomy ([`Problem`]).
//!
//! The request pipeline itself (nonce management, rate limiting, polling) lives in the
//! `acme-client` crate; everything here is pure data and crypto so it can be tested without a
//! server.

#![deny(missing_docs)]
#![deny(unsafe_code)]

mod b64u;
mod json;

pub mod account;
pub mod authorization;
pub mod csr;
pub mod directory;
pub mod eab;
pub mod error;
pub mod jws;
pub mod key;
pub mod order;
pub mod problem;

#[doc(inline)]
pub use authorization::{Authorization, Challenge};

#[doc(inline)]
pub use csr::Csr;

#[doc(inline)]
pub use directory::Directory;

#[doc(inline)]
pub use error::Error;

#[doc(inline)]
pub use jws::Jws;

#[doc(inline)]
pub use key::KeyAlgorithm;

#[doc(inline)]
pub use order::{Identifier, Order};

#[doc(inline)]
pub use problem::{Problem, ProblemKind};

pub use b64u::{decode as b64u_decode, encode as b64u_encode};

/// Header name for nonces.
pub const REPLAY_NONCE: &str = "Replay-Nonce";

/// Header name for locations.
pub const LOCATION: &str = "Location";

/// Header name for rate-limit waits.
pub const RETRY_AFTER: &str = "Retry-After";

/// Content type used for all signed ACME requests.
pub const JOSE_JSON: &str = "application/jose+json";

/// Content type of RFC 7807 problem documents.
pub const PROBLEM_JSON: &str = "application/problem+json";

/// Content type of downloaded certificate chains.
pub const PEM_CERTIFICATE_CHAIN: &str = "application/pem-certificate-chain";
