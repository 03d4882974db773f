//! Flattened JWS creation for signed ACME requests (RFC 7515, RFC 8555 §6.2).

use std::convert::TryFrom;

use openssl::ecdsa::EcdsaSig;
use openssl::hash::{Hasher, MessageDigest};
use openssl::pkey::{HasPrivate, PKeyRef};
use openssl::sign::Signer;
use serde::Serialize;

use crate::key::{EcCurve, Jwk};
use crate::{b64u, Error};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Protected {
    alg: &'static str,
    nonce: String,
    url: String,
    #[serde(flatten)]
    key: KeyId,
}

/// Acme requires the use of *either* `jwk` *or* `kid` depending on the action taken.
///
/// The embedded JWK is only allowed for `newAccount` and key-rollover requests; everything
/// else identifies the account by its location URL.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyId {
    /// This is the actual JWK structure.
    Jwk(Jwk),

    /// This should be the account location.
    Kid(String),
}

/// A finished JWS in the flattened JSON serialization, ready to be posted.
#[derive(Debug, Serialize)]
pub struct Jws {
    protected: String,
    payload: String,
    signature: String,
}

impl Jws {
    /// Sign a JSON payload.
    ///
    /// `kid` selects the protected header identity: the account location if present, the
    /// embedded public JWK of `key` otherwise.
    pub fn new<P, T>(
        key: &PKeyRef<P>,
        kid: Option<String>,
        url: String,
        nonce: String,
        payload: &T,
    ) -> Result<Self, Error>
    where
        P: HasPrivate,
        T: Serialize,
    {
        Self::new_full(
            key,
            kid,
            url,
            nonce,
            b64u::encode(serde_json::to_string(payload)?.as_bytes()),
        )
    }

    /// Sign a pre-encoded payload. An empty string is the POST-as-GET payload.
    pub fn new_full<P: HasPrivate>(
        key: &PKeyRef<P>,
        kid: Option<String>,
        url: String,
        nonce: String,
        payload: String,
    ) -> Result<Self, Error> {
        let jwk = Jwk::try_from(key)?;
        Self::new_full_with_jwk(key, &jwk, kid, url, nonce, payload)
    }

    /// Like [`new_full`](Jws::new_full), but with a precomputed JWK of `key`, so callers which
    /// sign many requests (like an account) can inspect the key once instead of per request.
    pub fn new_full_with_jwk<P: HasPrivate>(
        key: &PKeyRef<P>,
        jwk: &Jwk,
        kid: Option<String>,
        url: String,
        nonce: String,
        payload: String,
    ) -> Result<Self, Error> {
        let protected = Protected {
            alg: jwk.key.jws_alg(),
            nonce,
            url,
            key: match kid {
                Some(kid) => KeyId::Kid(kid),
                None => KeyId::Jwk(jwk.clone()),
            },
        };

        let protected = b64u::encode(serde_json::to_string(&protected)?.as_bytes());

        let signature = {
            let prot = protected.as_bytes();
            let payload = payload.as_bytes();
            match jwk.key.curve() {
                None => sign_rsa(key, prot, payload),
                Some(curve) => sign_ec(key, curve, prot, payload),
            }?
        };

        Ok(Jws {
            protected,
            payload,
            signature: b64u::encode(&signature),
        })
    }

    /// The signing input is the b64u protected header and the b64u payload joined by a dot.
    fn signing_input(protected: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut input = Vec::with_capacity(protected.len() + 1 + payload.len());
        input.extend_from_slice(protected);
        input.push(b'.');
        input.extend_from_slice(payload);
        input
    }
}

fn sign_rsa<P>(key: &PKeyRef<P>, protected: &[u8], payload: &[u8]) -> Result<Vec<u8>, Error>
where
    P: HasPrivate,
{
    let mut signer = Signer::new(MessageDigest::sha256(), key)?;
    signer.set_rsa_padding(openssl::rsa::Padding::PKCS1)?;
    signer.update(&Jws::signing_input(protected, payload))?;
    Ok(signer.sign_to_vec()?)
}

/// ECDSA signatures in JWS are the raw `r || s` concatenation, both left-padded to the curve's
/// field size, not the DER structure openssl produces.
fn sign_ec<P>(
    key: &PKeyRef<P>,
    curve: EcCurve,
    protected: &[u8],
    payload: &[u8],
) -> Result<Vec<u8>, Error>
where
    P: HasPrivate,
{
    let mut hasher = Hasher::new(curve.digest())?;
    hasher.update(&Jws::signing_input(protected, payload))?;
    let digest = hasher.finish()?;

    let sig = EcdsaSig::sign(digest.as_ref(), key.ec_key()?.as_ref())?;

    let size = curve.field_size() as i32;
    let mut out = sig.r().to_vec_padded(size)?;
    out.extend(sig.s().to_vec_padded(size)?);
    Ok(out)
}

#[cfg(test)]
mod test {
    use openssl::hash::MessageDigest;
    use openssl::sign::Verifier;
    use serde_json::{json, Value};

    use crate::key::{EcCurve, KeyAlgorithm};
    use crate::{b64u, Error};

    use super::Jws;

    fn protected_of(jws: &Jws) -> Value {
        let raw = b64u::decode(&jws.protected).unwrap();
        serde_json::from_slice(&raw).unwrap()
    }

    #[test]
    fn protected_header_fields() -> Result<(), Error> {
        let key = KeyAlgorithm::default().generate()?;
        let jws = Jws::new(
            &key,
            Some("https://ca.example/acct/1".to_string()),
            "https://ca.example/new-order".to_string(),
            "nonce-123".to_string(),
            &json!({ "hello": "world" }),
        )?;

        let protected = protected_of(&jws);
        assert_eq!(protected["alg"], "ES256");
        assert_eq!(protected["nonce"], "nonce-123");
        assert_eq!(protected["url"], "https://ca.example/new-order");
        assert_eq!(protected["kid"], "https://ca.example/acct/1");
        assert!(protected.get("jwk").is_none());
        Ok(())
    }

    #[test]
    fn new_account_embeds_jwk() -> Result<(), Error> {
        let key = KeyAlgorithm::Ec(EcCurve::P384).generate()?;
        let jws = Jws::new_full(
            &key,
            None,
            "https://ca.example/new-acct".to_string(),
            "n".to_string(),
            String::new(),
        )?;

        let protected = protected_of(&jws);
        assert_eq!(protected["alg"], "ES384");
        assert_eq!(protected["jwk"]["kty"], "EC");
        assert_eq!(protected["jwk"]["crv"], "P-384");
        assert!(protected.get("kid").is_none());
        // POST-as-GET keeps the payload empty
        assert_eq!(jws.payload, "");
        Ok(())
    }

    #[test]
    fn ec_signature_is_fixed_width_and_verifies() -> Result<(), Error> {
        let key = KeyAlgorithm::Ec(EcCurve::P256).generate()?;
        let jws = Jws::new(
            &key,
            None,
            "https://ca.example/x".to_string(),
            "n".to_string(),
            &json!({}),
        )?;

        let signature = b64u::decode(&jws.signature).unwrap();
        assert_eq!(signature.len(), 64);

        // rebuild the DER signature and verify it against the signing input
        let r = openssl::bn::BigNum::from_slice(&signature[..32])?;
        let s = openssl::bn::BigNum::from_slice(&signature[32..])?;
        let der = openssl::ecdsa::EcdsaSig::from_private_components(r, s)?;

        let input = Jws::signing_input(jws.protected.as_bytes(), jws.payload.as_bytes());
        let digest = openssl::sha::sha256(&input);
        assert!(der.verify(&digest, key.ec_key()?.as_ref())?);
        Ok(())
    }

    #[test]
    fn rsa_signature_verifies() -> Result<(), Error> {
        let key = KeyAlgorithm::Rsa(2048).generate()?;
        let jws = Jws::new(
            &key,
            Some("kid".to_string()),
            "https://ca.example/x".to_string(),
            "n".to_string(),
            &json!({ "csr": "Zm9v" }),
        )?;

        let signature = b64u::decode(&jws.signature).unwrap();
        let input = Jws::signing_input(jws.protected.as_bytes(), jws.payload.as_bytes());

        let mut verifier = Verifier::new(MessageDigest::sha256(), &key)?;
        verifier.set_rsa_padding(openssl::rsa::Padding::PKCS1)?;
        verifier.update(&input)?;
        assert!(verifier.verify(&signature)?);
        Ok(())
    }
}
