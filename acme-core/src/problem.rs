//! RFC 7807 problem documents and their mapping to the ACME error taxonomy.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::order::Identifier;

/// Prefix of all ACME error type URNs (RFC 8555 §6.7).
pub const URN_PREFIX: &str = "urn:ietf:params:acme:error:";

/// The ACME error string for a "bad nonce" error.
pub const BAD_NONCE: &str = "urn:ietf:params:acme:error:badNonce";

/// An RFC 7807 problem document as returned by ACME servers with
/// `application/problem+json` responses.
///
/// Unknown members are kept in `extra` so nothing a CA sends is lost.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Problem {
    /// The ACME error type URN.
    #[serde(rename = "type", default)]
    pub ty: String,

    /// A textual detail string optionally provided by the ACME provider to inform the user
    /// more verbosely about why the error occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// The HTTP status code of the response this problem was carried in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Per-identifier sub problems of a `compound` error.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subproblems: Vec<Problem>,

    /// The identifier a sub problem refers to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<Identifier>,

    /// Algorithms the server would accept, sent along `badSignatureAlgorithm`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub algorithms: Vec<String>,

    /// URL the user should visit for `userActionRequired` errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,

    /// Seconds to wait, as recorded from a `Retry-After` header of the carrying response.
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,

    /// Stores unknown fields if there are any.
    #[serde(flatten, default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, Value>,
}

impl Problem {
    /// Parse a problem document from a response body.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// The `type` URN with the common ACME prefix stripped, if it carries it.
    pub fn urn_suffix(&self) -> Option<&str> {
        self.ty.strip_prefix(URN_PREFIX)
    }

    /// Whether this is a `badNonce` problem which should be retried with a fresh nonce.
    pub fn is_bad_nonce(&self) -> bool {
        self.ty == BAD_NONCE
    }

    /// Map this problem document onto the typed taxonomy. Pure; never fails.
    pub fn kind(&self) -> ProblemKind {
        let suffix = match self.urn_suffix() {
            Some(suffix) => suffix,
            None => return ProblemKind::Unknown(self.ty.clone()),
        };

        match suffix {
            "badNonce" => ProblemKind::BadNonce,
            "badCSR" => ProblemKind::BadCsr,
            "badPublicKey" => ProblemKind::BadPublicKey,
            "badSignatureAlgorithm" => ProblemKind::BadSignatureAlgorithm {
                algorithms: self.algorithms.clone(),
            },
            "rateLimited" => ProblemKind::RateLimited {
                retry_after: self.retry_after,
            },
            "malformed" => ProblemKind::Malformed,
            "unauthorized" => ProblemKind::Unauthorized,
            "accountDoesNotExist" => ProblemKind::AccountDoesNotExist,
            "alreadyRevoked" => ProblemKind::AlreadyRevoked,
            "caa" => ProblemKind::Caa,
            "compound" => ProblemKind::Compound,
            "connection" => ProblemKind::Connection,
            "dns" => ProblemKind::Dns,
            "externalAccountRequired" => ProblemKind::ExternalAccountRequired,
            "incorrectResponse" => ProblemKind::IncorrectResponse,
            "invalidContact" => ProblemKind::InvalidContact,
            "orderNotReady" => ProblemKind::OrderNotReady,
            "rejectedIdentifier" => ProblemKind::RejectedIdentifier,
            "serverInternal" => {
                if self.status == Some(503) && self.mentions_maintenance() {
                    ProblemKind::ServerMaintenance
                } else {
                    ProblemKind::ServerInternal
                }
            }
            "serverMaintenance" => ProblemKind::ServerMaintenance,
            "tls" => ProblemKind::Tls,
            "unsupportedContact" => ProblemKind::UnsupportedContact,
            "unsupportedIdentifier" => ProblemKind::UnsupportedIdentifier,
            "userActionRequired" => ProblemKind::UserActionRequired {
                instance: self.instance.clone(),
            },
            other => ProblemKind::Unknown(format!("{}{}", URN_PREFIX, other)),
        }
    }

    fn mentions_maintenance(&self) -> bool {
        self.detail
            .as_deref()
            .map(|detail| detail.to_ascii_lowercase().contains("maintenance"))
            .unwrap_or(false)
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.detail.as_deref() {
            Some(detail) => write!(f, "{}: {}", self.ty, detail),
            None => fmt::Display::fmt(&self.ty, f),
        }
    }
}

/// The ACME error taxonomy: one variant per `urn:ietf:params:acme:error:*` type, with the
/// payload members that type carries.
#[derive(Clone, Debug, Eq, PartialEq)]
#[allow(missing_docs)]
pub enum ProblemKind {
    BadNonce,
    BadCsr,
    BadPublicKey,
    /// The server rejected the signature algorithm; `algorithms` lists acceptable ones.
    BadSignatureAlgorithm {
        algorithms: Vec<String>,
    },
    /// The request hit a CA rate limit; `retry_after` is seconds, when the CA told us.
    RateLimited {
        retry_after: Option<u64>,
    },
    Malformed,
    Unauthorized,
    AccountDoesNotExist,
    AlreadyRevoked,
    Caa,
    /// Several sub problems apply; inspect [`Problem::subproblems`].
    Compound,
    Connection,
    Dns,
    ExternalAccountRequired,
    IncorrectResponse,
    InvalidContact,
    OrderNotReady,
    RejectedIdentifier,
    ServerInternal,
    /// A 503 response whose detail announces a maintenance window.
    ServerMaintenance,
    Tls,
    UnsupportedContact,
    UnsupportedIdentifier,
    /// Typically a ToS change; `instance` points the user at the page to visit.
    UserActionRequired {
        instance: Option<String>,
    },
    /// Any type URN this crate does not know about, kept verbatim.
    Unknown(String),
}

impl ProblemKind {
    /// Whether a request failing with this kind may succeed if simply retried later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProblemKind::RateLimited { .. }
                | ProblemKind::ServerInternal
                | ProblemKind::ServerMaintenance
        )
    }
}
