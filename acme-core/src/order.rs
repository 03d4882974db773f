//! Order data and the order state machine.

use serde::{Deserialize, Serialize};

use crate::problem::Problem;

/// The order state machine: `pending -> ready -> processing -> valid`, with `invalid`
/// reachable from anywhere.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Local-only marker for an order that has not been submitted yet. Never serialized (the
    /// RFC does not oblige servers to tolerate a status in the request body).
    New,

    /// Some authorization still needs solving.
    Pending,

    /// Every authorization succeeded; the CSR can be submitted.
    Ready,

    /// The CA accepted the CSR and is issuing.
    Processing,

    /// Issued; the certificate URL is populated. Terminal.
    Valid,

    /// Failed for good. Terminal.
    Invalid,
}

impl Default for Status {
    fn default() -> Self {
        Status::New
    }
}

impl Status {
    /// Serde helper.
    pub fn is_new(&self) -> bool {
        *self == Status::New
    }

    /// Whether the order cannot change state anymore.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Valid | Status::Invalid)
    }

    /// Position in the happy path `pending -> ready -> processing -> valid`, used to verify
    /// that polled orders never move backwards. `Invalid` compares as terminal.
    pub fn rank(self) -> u8 {
        match self {
            Status::New => 0,
            Status::Pending => 1,
            Status::Ready => 2,
            Status::Processing => 3,
            Status::Valid => 4,
            Status::Invalid => 4,
        }
    }
}

/// An identifier a certificate is requested for.
///
/// Serializes to `{"type": "dns", "value": "<name>"}`.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Identifier {
    /// A DNS name, possibly a wildcard.
    Dns(String),
}

impl Identifier {
    /// The identifier value without its type tag.
    pub fn value(&self) -> &str {
        match self {
            Identifier::Dns(value) => value,
        }
    }
}

/// The order resource on the wire, doubling as the `newOrder` request body (where only the
/// identifiers and the optional validity window are sent).
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderData {
    /// Where in the state machine this order is.
    #[serde(skip_serializing_if = "Status::is_new", default)]
    pub status: Status,

    /// RFC 3339 timestamp after which an unfinished order is thrown away.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,

    /// The names the certificate shall cover.
    pub identifiers: Vec<Identifier>,

    /// Requested start of the certificate's validity, RFC 3339.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,

    /// Requested end of the certificate's validity, RFC 3339.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_after: Option<String>,

    /// Why the order went `invalid`, when the CA says.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Problem>,

    /// One authorization URL per identifier, each to be solved.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authorizations: Vec<String>,

    /// Where the CSR goes once the order is `ready`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalize: Option<String>,

    /// Where the issued chain can be downloaded, present once `valid`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
}

impl OrderData {
    /// Create an empty order request body.
    pub fn new() -> Self {
        Default::default()
    }

    /// Builder-style helper to add a DNS identifier.
    pub fn domain(mut self, domain: String) -> Self {
        self.identifiers.push(Identifier::Dns(domain));
        self
    }
}

/// An order resource together with its location URL.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Order location URL, from the `Location` header of the creation response.
    pub url: String,

    /// The order's data object.
    pub data: OrderData,
}

impl Order {
    /// Get an authorization URL (or `None` if the index is out of range).
    pub fn authorization(&self, index: usize) -> Option<&str> {
        self.data.authorizations.get(index).map(String::as_str)
    }

    /// Get the number of authorizations in this object.
    pub fn authorization_len(&self) -> usize {
        self.data.authorizations.len()
    }
}
