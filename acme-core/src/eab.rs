//! External Account Binding (RFC 8555 §7.3.4).

use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::sign::Signer;
use serde::{Deserialize, Serialize};

use crate::key::Jwk;
use crate::{b64u, Error};

/// The EAB member of a `newAccount` payload: an HS256 JWS over the account's public JWK,
/// keyed with the secret the CA handed out out-of-band.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalAccountBinding {
    /// JOSE Header (see RFC 7515).
    pub protected: String,
    /// Payload.
    pub payload: String,
    /// HMAC signature.
    pub signature: String,
}

/// EAB credentials as handed out by the CA: a key identifier and the raw HMAC key.
#[derive(Clone)]
pub struct EabCredentials {
    /// The key identifier the CA issued.
    pub kid: String,
    hmac_key: PKey<Private>,
}

impl EabCredentials {
    /// Create credentials from the CA-issued key id and base64 encoded HMAC key.
    ///
    /// CAs hand the key out in either standard or url-safe base64; both are accepted.
    pub fn new(kid: String, hmac_key: &str) -> Result<Self, Error> {
        use base64::Engine;

        let hmac_key = if hmac_key.contains('+') || hmac_key.contains('/') {
            base64::engine::general_purpose::STANDARD
                .decode(hmac_key)
                .or_else(|_| base64::engine::general_purpose::STANDARD_NO_PAD.decode(hmac_key))?
        } else {
            b64u::decode(hmac_key.trim_end_matches('='))?
        };

        Ok(Self {
            kid,
            hmac_key: PKey::hmac(&hmac_key)?,
        })
    }

    /// Bind `jwk` (the account public key) to this external account for a registration
    /// against `new_account_url`.
    ///
    /// The result goes into the `externalAccountBinding` member of the `newAccount` payload.
    /// Unlike the outer request JWS this one carries no nonce and is signed with the CA's
    /// shared HMAC secret, not the account key.
    pub fn bind(&self, jwk: &Jwk, new_account_url: &str) -> Result<ExternalAccountBinding, Error> {
        let header = serde_json::json!({
            "alg": "HS256",
            "kid": self.kid,
            "url": new_account_url,
        });

        let protected = b64u::encode(header.to_string().as_bytes());
        let payload = b64u::encode(serde_json::to_string(jwk)?.as_bytes());

        let mut signer = Signer::new(MessageDigest::sha256(), &self.hmac_key)?;
        signer.update(format!("{}.{}", protected, payload).as_bytes())?;
        let signature = b64u::encode(&signer.sign_to_vec()?);

        Ok(ExternalAccountBinding {
            protected,
            payload,
            signature,
        })
    }
}
