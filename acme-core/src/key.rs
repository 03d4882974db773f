//! Account key handling: key generation, JWK serialization, thumbprints and key
//! authorizations.

use std::convert::TryFrom;

use openssl::bn::BigNumContext;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{HasPublic, Id, PKey, PKeyRef, Private};
use openssl::rsa::Rsa;
use serde::Serialize;

use crate::b64u;
use crate::Error;

/// The elliptic curves usable for account and CSR keys.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EcCurve {
    /// NIST P-256 (`prime256v1`), paired with SHA-256.
    P256,
    /// NIST P-384 (`secp384r1`), paired with SHA-384.
    P384,
    /// NIST P-521 (`secp521r1`), paired with SHA-512.
    P521,
}

impl EcCurve {
    pub(crate) fn nid(self) -> Nid {
        match self {
            EcCurve::P256 => Nid::X9_62_PRIME256V1,
            EcCurve::P384 => Nid::SECP384R1,
            EcCurve::P521 => Nid::SECP521R1,
        }
    }

    pub(crate) fn from_nid(nid: Nid) -> Option<Self> {
        match nid {
            Nid::X9_62_PRIME256V1 => Some(EcCurve::P256),
            Nid::SECP384R1 => Some(EcCurve::P384),
            Nid::SECP521R1 => Some(EcCurve::P521),
            _ => None,
        }
    }

    /// The JWK `crv` member for this curve.
    pub fn crv(self) -> &'static str {
        match self {
            EcCurve::P256 => "P-256",
            EcCurve::P384 => "P-384",
            EcCurve::P521 => "P-521",
        }
    }

    /// Size of one field element (and of the signature components `r` and `s`) in bytes.
    pub(crate) fn field_size(self) -> usize {
        match self {
            EcCurve::P256 => 32,
            EcCurve::P384 => 48,
            EcCurve::P521 => 66,
        }
    }

    /// The JWS `alg` value paired with this curve.
    pub fn jws_alg(self) -> &'static str {
        match self {
            EcCurve::P256 => "ES256",
            EcCurve::P384 => "ES384",
            EcCurve::P521 => "ES512",
        }
    }

    pub(crate) fn digest(self) -> MessageDigest {
        match self {
            EcCurve::P256 => MessageDigest::sha256(),
            EcCurve::P384 => MessageDigest::sha384(),
            EcCurve::P521 => MessageDigest::sha512(),
        }
    }
}

/// Key generation parameters for account keys and CSR keys.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyAlgorithm {
    /// An ECDSA key on the given curve.
    Ec(EcCurve),
    /// An RSA key of the given modulus size (2048, 3072 or 4096 bits).
    Rsa(u32),
}

impl Default for KeyAlgorithm {
    fn default() -> Self {
        KeyAlgorithm::Ec(EcCurve::P256)
    }
}

impl KeyAlgorithm {
    /// Generate a fresh private key.
    pub fn generate(self) -> Result<PKey<Private>, Error> {
        match self {
            KeyAlgorithm::Ec(curve) => {
                let group = EcGroup::from_curve_name(curve.nid())?;
                let key = EcKey::generate(&group)?;
                Ok(PKey::from_ec_key(key)?)
            }
            KeyAlgorithm::Rsa(bits) => {
                if !matches!(bits, 2048 | 3072 | 4096) {
                    return Err(Error::UnsupportedKeySize(bits));
                }
                let key = Rsa::generate(bits)?;
                Ok(PKey::from_rsa(key)?)
            }
        }
    }

    pub(crate) fn digest(self) -> MessageDigest {
        match self {
            KeyAlgorithm::Ec(curve) => curve.digest(),
            KeyAlgorithm::Rsa(_) => MessageDigest::sha256(),
        }
    }
}

/// An RSA public key.
#[derive(Clone, Debug, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RsaPublicKey {
    #[serde(with = "b64u::bytes")]
    e: Vec<u8>,
    #[serde(with = "b64u::bytes")]
    n: Vec<u8>,
}

/// An EC public key.
#[derive(Clone, Debug, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EcPublicKey {
    crv: &'static str,
    #[serde(with = "b64u::bytes")]
    x: Vec<u8>,
    #[serde(with = "b64u::bytes")]
    y: Vec<u8>,
}

/// A public key.
///
/// Internally tagged, so this already contains the 'kty' member.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kty")]
pub enum PublicKey {
    /// An RSA public key (`kty = "RSA"`).
    #[serde(rename = "RSA")]
    Rsa(RsaPublicKey),
    /// An EC public key (`kty = "EC"`).
    #[serde(rename = "EC")]
    Ec(EcPublicKey),
}

impl PublicKey {
    /// The curve of an EC key, `None` for RSA keys.
    pub fn curve(&self) -> Option<EcCurve> {
        match self {
            PublicKey::Rsa(_) => None,
            PublicKey::Ec(key) => Some(match key.crv {
                "P-384" => EcCurve::P384,
                "P-521" => EcCurve::P521,
                _ => EcCurve::P256,
            }),
        }
    }

    /// The JWS signature algorithm this key signs with.
    ///
    /// This is fixed per key: RSA keys use `RS256`, EC keys use the `ES*` variant matching
    /// their curve.
    pub fn jws_alg(&self) -> &'static str {
        match self.curve() {
            None => "RS256",
            Some(curve) => curve.jws_alg(),
        }
    }

    /// The thumbprint is the b64u encoded sha256sum of the *canonical* json representation.
    pub fn thumbprint(&self) -> Result<String, Error> {
        let canonical = crate::json::canonical(&serde_json::to_value(self)?)?;
        Ok(b64u::encode(&openssl::sha::sha256(canonical.as_bytes())))
    }
}

/// A JSON Web Key as embedded into JWS protected headers and EAB payloads.
#[derive(Clone, Debug, Serialize)]
pub struct Jwk {
    /// The key's intended usage.
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,

    /// The key data is internally tagged, we can just flatten it.
    #[serde(flatten)]
    pub key: PublicKey,
}

impl Jwk {
    /// Shortcut for the [`PublicKey::thumbprint`] of the contained key.
    pub fn thumbprint(&self) -> Result<String, Error> {
        self.key.thumbprint()
    }
}

impl<P: HasPublic> TryFrom<&PKeyRef<P>> for Jwk {
    type Error = Error;

    fn try_from(key: &PKeyRef<P>) -> Result<Self, Self::Error> {
        Ok(Self {
            key: PublicKey::try_from(key)?,
            usage: None,
        })
    }
}

impl<P: HasPublic> TryFrom<&PKeyRef<P>> for PublicKey {
    type Error = Error;

    fn try_from(key: &PKeyRef<P>) -> Result<Self, Self::Error> {
        match key.id() {
            Id::RSA => Ok(PublicKey::Rsa(RsaPublicKey::try_from(&key.rsa()?)?)),
            Id::EC => Ok(PublicKey::Ec(EcPublicKey::try_from(&key.ec_key()?)?)),
            _ => Err(Error::UnsupportedKeyType),
        }
    }
}

impl<P: HasPublic> TryFrom<&Rsa<P>> for RsaPublicKey {
    type Error = Error;

    fn try_from(key: &Rsa<P>) -> Result<Self, Self::Error> {
        Ok(RsaPublicKey {
            e: key.e().to_vec(),
            n: key.n().to_vec(),
        })
    }
}

impl<P: HasPublic> TryFrom<&EcKey<P>> for EcPublicKey {
    type Error = Error;

    fn try_from(key: &EcKey<P>) -> Result<Self, Self::Error> {
        let group = key.group();

        let curve = group
            .curve_name()
            .and_then(EcCurve::from_nid)
            .ok_or(Error::UnsupportedGroup)?;

        let mut ctx = BigNumContext::new()?;
        let mut x = openssl::bn::BigNum::new()?;
        let mut y = openssl::bn::BigNum::new()?;
        key.public_key()
            .affine_coordinates(group, &mut x, &mut y, &mut ctx)?;

        // JWK coordinates are fixed-width, left-padded to the field size.
        let size = curve.field_size() as i32;
        Ok(EcPublicKey {
            crv: curve.crv(),
            x: x.to_vec_padded(size)?,
            y: y.to_vec_padded(size)?,
        })
    }
}

/// Extract the curve of an EC `PKey`, if it is an EC key on a supported curve.
pub(crate) fn ec_curve<P: HasPublic>(key: &PKeyRef<P>) -> Result<Option<EcCurve>, Error> {
    if key.id() != Id::EC {
        return Ok(None);
    }
    key.ec_key()?
        .group()
        .curve_name()
        .and_then(EcCurve::from_nid)
        .map(Some)
        .ok_or(Error::UnsupportedGroup)
}

/// Compute the key authorization for a challenge token (RFC 8555 §8.1).
///
/// This is `token || "." || b64u(sha256(canonical JWK))`, deterministic for a fixed key and
/// token.
pub fn key_authorization<P: HasPublic>(key: &PKeyRef<P>, token: &str) -> Result<String, Error> {
    let thumbprint = PublicKey::try_from(key)?.thumbprint()?;
    Ok(format!("{}.{}", token, thumbprint))
}

/// The TXT record value for a dns-01 challenge: the base64url encoded sha256 digest of the key
/// authorization.
pub fn dns_01_txt_value(key_authorization: &str) -> String {
    b64u::encode(&openssl::sha::sha256(key_authorization.as_bytes()))
}

#[cfg(test)]
mod test {
    use std::convert::TryFrom;

    use super::*;

    #[test]
    fn generated_keys_map_to_expected_algs() {
        for (algorithm, alg) in [
            (KeyAlgorithm::Ec(EcCurve::P256), "ES256"),
            (KeyAlgorithm::Ec(EcCurve::P384), "ES384"),
            (KeyAlgorithm::Ec(EcCurve::P521), "ES512"),
            (KeyAlgorithm::Rsa(2048), "RS256"),
        ] {
            let key = algorithm.generate().unwrap();
            let public = PublicKey::try_from(&*key).unwrap();
            assert_eq!(public.jws_alg(), alg);
        }
    }

    #[test]
    fn rejects_odd_rsa_sizes() {
        assert!(matches!(
            KeyAlgorithm::Rsa(1024).generate(),
            Err(Error::UnsupportedKeySize(1024))
        ));
    }

    #[test]
    fn ec_coordinates_are_field_sized() {
        let key = KeyAlgorithm::Ec(EcCurve::P521).generate().unwrap();
        match PublicKey::try_from(&*key).unwrap() {
            PublicKey::Ec(ec) => {
                assert_eq!(ec.x.len(), 66);
                assert_eq!(ec.y.len(), 66);
            }
            _ => panic!("expected an EC key"),
        }
    }

    #[test]
    fn thumbprint_is_stable_and_urlsafe() {
        let key = KeyAlgorithm::default().generate().unwrap();
        let public = PublicKey::try_from(&*key).unwrap();
        let a = public.thumbprint().unwrap();
        let b = public.thumbprint().unwrap();
        assert_eq!(a, b);
        // sha256 -> 32 bytes -> 43 unpadded base64url characters
        assert_eq!(a.len(), 43);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn key_authorization_format() {
        let key = KeyAlgorithm::default().generate().unwrap();
        let token = "evaGxfADs6pSRb2LAv9IZf17Dt3juxGJ-PCt92wr-oA";
        let key_auth = key_authorization(&key, token).unwrap();
        let thumbprint = PublicKey::try_from(&*key).unwrap().thumbprint().unwrap();
        assert_eq!(key_auth, format!("{}.{}", token, thumbprint));

        let txt = dns_01_txt_value(&key_auth);
        assert_eq!(txt.len(), 43);
        assert_eq!(crate::b64u::decode(&txt).unwrap().len(), 32);
    }
}
