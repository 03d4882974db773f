//! The account object exchanged with the `newAccount` endpoint and the account URL.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::eab::ExternalAccountBinding;

/// Server-side account states (RFC 8555 §7.1.2).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AccountStatus {
    /// Usable for all operations.
    Valid,

    /// Shut down on the account holder's request; the key is refused from here on.
    Deactivated,

    /// Shut down by the CA.
    Revoked,
}

/// The account representation on the wire.
///
/// A registration request serializes a subset of this (no status); responses and account
/// updates fill in the rest. Members this crate does not know stay available in `extra`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountData {
    /// Contact URIs, usually `mailto:` entries. Optional on the wire.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contact: Vec<String>,

    /// Set to `true` in the registration request to accept the CA's terms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_of_service_agreed: Option<bool>,

    /// Pre-authenticated binding to an existing CA-side account, where required.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_account_binding: Option<ExternalAccountBinding>,

    /// Ask the CA to only look the account up, never to create it.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub only_return_existing: bool,

    /// The account state as reported by the CA; never sent by a client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AccountStatus>,

    /// URL listing the account's orders, reported by the CA.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orders: Option<String>,

    /// Anything else the CA put into the account object.
    #[serde(flatten, default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, Value>,
}
