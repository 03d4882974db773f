//! The CA's directory: the one unauthenticated resource, mapping every operation to its URL.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The endpoint table a CA serves at its well-known directory URL (RFC 8555 §7.1.1).
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    /// `HEAD` here to obtain a fresh `Replay-Nonce`.
    pub new_nonce: String,

    /// Registration endpoint.
    pub new_account: String,

    /// Order creation endpoint.
    pub new_order: String,

    /// Revocation endpoint.
    pub revoke_cert: String,

    /// Account key rollover endpoint.
    pub key_change: String,

    /// Non-protocol information the CA wants clients to know.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<DirectoryMeta>,
}

/// The optional `meta` member of a directory.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryMeta {
    /// URL of the terms of service the CA wants agreed to at registration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_of_service: Option<String>,

    /// CA homepage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,

    /// `true` when `newAccount` will be refused without External Account Binding
    /// credentials. Absent counts as `false`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_account_required: Option<bool>,

    /// Members this crate does not interpret (`caaIdentities` and friends).
    #[serde(flatten, default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, Value>,
}

/// A fetched directory: the URL it came from plus its endpoint table.
///
/// Immutable once constructed; the client caches one per CA.
#[derive(Clone, Debug)]
pub struct Directory {
    url: String,
    endpoints: Endpoints,
}

impl Directory {
    /// Pair a parsed endpoint table with the URL it was fetched from.
    pub fn new(url: String, endpoints: Endpoints) -> Self {
        Self { url, endpoints }
    }

    /// The well-known URL this directory was fetched from.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The nonce endpoint, for `HEAD` requests.
    pub fn new_nonce_url(&self) -> &str {
        &self.endpoints.new_nonce
    }

    /// The registration endpoint.
    pub fn new_account_url(&self) -> &str {
        &self.endpoints.new_account
    }

    /// The order creation endpoint.
    pub fn new_order_url(&self) -> &str {
        &self.endpoints.new_order
    }

    /// The revocation endpoint.
    pub fn revoke_cert_url(&self) -> &str {
        &self.endpoints.revoke_cert
    }

    /// The key rollover endpoint.
    pub fn key_change_url(&self) -> &str {
        &self.endpoints.key_change
    }

    /// The terms-of-service URL, when the CA announces one.
    pub fn terms_of_service_url(&self) -> Option<&str> {
        self.meta().and_then(|meta| meta.terms_of_service.as_deref())
    }

    /// Whether registration requires External Account Binding credentials.
    pub fn external_account_binding_required(&self) -> bool {
        self.meta()
            .and_then(|meta| meta.external_account_required)
            .unwrap_or(false)
    }

    /// The directory's `meta` member, if the CA sent one.
    pub fn meta(&self) -> Option<&DirectoryMeta> {
        self.endpoints.meta.as_ref()
    }
}
