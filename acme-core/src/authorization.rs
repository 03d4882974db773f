//! Authorizations and the challenges they offer.
//!
//! An order carries one authorization per identifier; each authorization offers several
//! challenges of which exactly one has to be completed. The solver in the client crate walks
//! these; this module only models the resources.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::order::Identifier;
use crate::problem::Problem;

/// Lifecycle states of an [`Authorization`] (RFC 8555 §7.1.6).
///
/// Only `Pending` can still be acted on. `Valid` needs no action; everything else is a dead
/// end for the containing order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Waiting for the client to complete one of the offered challenges.
    Pending,

    /// A challenge succeeded; certificates may be issued for the identifier.
    Valid,

    /// A challenge failed, taking the authorization with it.
    Invalid,

    /// Switched off on the client's request.
    Deactivated,

    /// The validity window closed before any challenge succeeded.
    Expired,

    /// Withdrawn by the server.
    Revoked,
}

/// Proof duty for one identifier of an order.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    /// Which identifier this proof is about.
    pub identifier: Identifier,

    /// Where in its lifecycle this authorization is.
    pub status: Status,

    /// RFC 3339 timestamp after which the authorization is no longer usable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,

    /// The challenges offered by the CA; completing any single one suffices.
    pub challenges: Vec<Challenge>,

    /// Set when the order asked for a wildcard name. The `identifier` then carries the name
    /// without its `*.` label, and only dns-01 can prove it.
    #[serde(default, skip_serializing_if = "is_false")]
    pub wildcard: bool,
}

impl Authorization {
    /// Find the first challenge of the given type, in the server's order.
    pub fn challenge(&self, ty: ChallengeType) -> Option<&Challenge> {
        self.challenges.iter().find(|c| c.ty == ty)
    }
}

/// Lifecycle states of a [`Challenge`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    /// Not yet submitted for validation.
    Pending,

    /// Submitted; the CA is querying the proof.
    Processing,

    /// The proof checked out.
    Valid,

    /// The proof could not be confirmed; see the challenge's `error`.
    Invalid,
}

/// The validation method of a challenge.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum ChallengeType {
    /// Validation via a well-known HTTP resource.
    #[serde(rename = "http-01")]
    Http01,

    /// Validation via a DNS TXT record.
    #[serde(rename = "dns-01")]
    Dns01,

    /// Validation via a TLS ALPN certificate.
    #[serde(rename = "tls-alpn-01")]
    TlsAlpn01,

    /// A challenge type this crate does not know about.
    #[serde(other, rename = "unknown")]
    Unknown,
}

/// One way of proving control over an identifier.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    /// The validation method.
    #[serde(rename = "type")]
    pub ty: ChallengeType,

    /// Where in its lifecycle this challenge is.
    pub status: ChallengeStatus,

    /// POSTing an empty JSON object here asks the CA to start validating.
    pub url: String,

    /// Random value chosen by the CA, combined with the account key thumbprint to form the
    /// key authorization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// What went wrong, for challenges the CA gave up on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Problem>,

    /// RFC 3339 timestamp of the successful validation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validated: Option<String>,

    /// Whatever else the CA put into the challenge object.
    #[serde(flatten, default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, Value>,
}

impl Challenge {
    /// Access the token, which most challenge types require.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// Serde helper.
#[inline]
fn is_false(b: &bool) -> bool {
    !*b
}
