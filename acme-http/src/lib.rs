//! Simple TLS capable HTTP transport for talking to ACME providers.
//!
//! Contains a lightweight wrapper around `hyper` with openssl TLS support and a [`Response`]
//! type which decodes bodies according to their `Content-Type`, the way the ACME wire protocol
//! needs it. The transport never fails on HTTP error statuses, only on connection, timeout or
//! decode problems; interpreting statuses is the caller's job.

mod client;
mod connector;
mod options;
mod response;
mod stream;

pub use client::HttpClient;
pub use connector::HttpsConnector;
pub use options::HttpOptions;
pub use response::{Body, Response};
pub use stream::ConnStream;
