//! PKCS#10 certificate request generation for order finalization.

use openssl::pkey::{PKey, Private};
use openssl::x509::{self, X509Name, X509Req};

use crate::key::KeyAlgorithm;
use crate::{b64u, Error};

/// A certificate signing request, ready to be passed to order finalization, together with the
/// key pair the eventual certificate belongs to.
pub struct Csr {
    /// DER encoded certificate request.
    pub der: Vec<u8>,

    /// PEM encoded certificate request (`-----BEGIN CERTIFICATE REQUEST-----`).
    pub pem: String,

    /// Unpadded base64url of the DER, the form ACME finalization expects.
    pub der_b64u: String,

    /// The certificate key pair.
    pub key: PKey<Private>,

    /// PEM formatted PKCS#8 private key.
    pub private_key_pem: Vec<u8>,
}

/// Options for [`Csr::generate`].
#[derive(Default)]
pub struct CsrOptions {
    /// Key generation parameters, used when no key is supplied. Defaults to EC P-256.
    pub algorithm: KeyAlgorithm,

    /// Subject common name. Defaults to the first identifier.
    pub common_name: Option<String>,

    /// Use this key pair instead of generating a fresh one.
    pub key: Option<PKey<Private>>,
}

impl Csr {
    /// Generate a CSR for a set of DNS identifiers.
    ///
    /// The subject CN is the configured common name or the first identifier; every identifier
    /// (wildcards included, verbatim) becomes a `dNSName` SAN entry. The signature digest
    /// follows the key: SHA-256/384/512 for the matching EC curve, SHA-256 for RSA.
    pub fn generate(identifiers: &[impl AsRef<str>], options: CsrOptions) -> Result<Self, Error> {
        if identifiers.is_empty() {
            return Err(Error::EmptyIdentifiers);
        }

        let key = match options.key {
            Some(key) => key,
            None => options.algorithm.generate()?,
        };

        let digest = match crate::key::ec_curve(&key)? {
            Some(curve) => curve.digest(),
            None if key.id() == openssl::pkey::Id::RSA => openssl::hash::MessageDigest::sha256(),
            None => return Err(Error::UnsupportedKeyType),
        };

        let private_key_pem = key
            .private_key_to_pem_pkcs8()
            .map_err(|err| Error::Ssl("failed to format private key as PEM pkcs8", err))?;

        let common_name = match options.common_name.as_deref() {
            Some(name) => name,
            None => identifiers[0].as_ref(),
        };

        let mut name = X509Name::builder()?;
        name.append_entry_by_nid(openssl::nid::Nid::COMMONNAME, common_name)?;
        let name = name.build();

        let mut csr = X509Req::builder()?;
        csr.set_subject_name(&name)?;
        csr.set_pubkey(&key)?;

        let context = csr.x509v3_context(None);
        let mut ext = openssl::stack::Stack::new()?;
        ext.push(x509::extension::BasicConstraints::new().build()?)?;
        ext.push(
            x509::extension::KeyUsage::new()
                .digital_signature()
                .key_encipherment()
                .build()?,
        )?;
        ext.push(
            x509::extension::ExtendedKeyUsage::new()
                .server_auth()
                .client_auth()
                .build()?,
        )?;
        let mut san = x509::extension::SubjectAlternativeName::new();
        for dns in identifiers {
            san.dns(dns.as_ref());
        }
        ext.push({ san }.build(&context)?)?;
        csr.add_extensions(&ext)?;

        csr.sign(&key, digest)?;

        let csr = csr.build();
        let der = csr.to_der()?;
        let pem = String::from_utf8(csr.to_pem()?)
            .map_err(|err| Error::Csr(format!("CSR PEM is not utf-8: {}", err)))?;

        Ok(Self {
            der_b64u: b64u::encode(&der),
            der,
            pem,
            key,
            private_key_pem,
        })
    }
}

#[cfg(test)]
mod test {
    use openssl::x509::X509Req;

    use super::{Csr, CsrOptions};
    use crate::key::{EcCurve, KeyAlgorithm};

    #[test]
    fn generates_a_verifiable_request() {
        let csr = Csr::generate(
            &["example.com", "*.example.com"],
            CsrOptions {
                algorithm: KeyAlgorithm::Ec(EcCurve::P256),
                ..Default::default()
            },
        )
        .unwrap();

        assert!(csr.pem.starts_with("-----BEGIN CERTIFICATE REQUEST-----"));
        assert!(!csr.der_b64u.contains(['=', '+', '/']));

        let parsed = X509Req::from_der(&csr.der).unwrap();
        assert!(parsed.verify(&csr.key).unwrap());

        let cn = parsed
            .subject_name()
            .entries_by_nid(openssl::nid::Nid::COMMONNAME)
            .next()
            .unwrap();
        assert_eq!(cn.data().as_utf8().unwrap().to_string(), "example.com");

        // both SAN entries end up in the request as IA5Strings
        let der = csr.der.clone();
        let contains = |needle: &[u8]| der.windows(needle.len()).any(|w| w == needle);
        assert!(contains(b"example.com"));
        assert!(contains(b"*.example.com"));
    }

    #[test]
    fn honors_supplied_common_name_and_key() {
        let key = KeyAlgorithm::Rsa(2048).generate().unwrap();
        let csr = Csr::generate(
            &["www.example.org", "example.org"],
            CsrOptions {
                common_name: Some("example.org".to_string()),
                key: Some(key.clone()),
                ..Default::default()
            },
        )
        .unwrap();

        let parsed = X509Req::from_der(&csr.der).unwrap();
        let cn = parsed
            .subject_name()
            .entries_by_nid(openssl::nid::Nid::COMMONNAME)
            .next()
            .unwrap();
        assert_eq!(cn.data().as_utf8().unwrap().to_string(), "example.org");
        assert!(parsed.verify(&key).unwrap());
    }

    #[test]
    fn refuses_empty_identifier_lists() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            Csr::generate(&empty, CsrOptions::default()),
            Err(crate::Error::EmptyIdentifiers)
        ));
    }
}
