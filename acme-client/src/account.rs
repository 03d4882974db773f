//! Account key material and registration state.

use std::convert::TryFrom;
use std::sync::OnceLock;

use openssl::pkey::{PKey, PKeyRef, Private};

use acme_core::eab::EabCredentials;
use acme_core::jws::Jws;
use acme_core::key::{self, Jwk, KeyAlgorithm};

use crate::error::Error;

/// An ACME account: a private key, contact data, and the account URL (`kid`) the CA assigns
/// on registration.
///
/// The key pair is owned by the account and never mutated; the `kid` is write-once. One
/// account instance may be shared freely across tasks, all protocol operations go through a
/// [`Client`](crate::Client) borrowing it.
pub struct Account {
    key: PKey<Private>,
    /// Public JWK and JWS algorithm, derived from the key once at construction.
    jwk: Jwk,
    alg: &'static str,
    thumbprint: String,
    contacts: Vec<String>,
    tos_agreed: bool,
    eab: Option<EabCredentials>,
    kid: OnceLock<String>,
    /// Serializes `ensure_registered` calls on this instance.
    pub(crate) registration: tokio::sync::Mutex<()>,
}

impl Account {
    /// Start building an account.
    pub fn builder() -> AccountBuilder {
        AccountBuilder::default()
    }

    /// The account's private key.
    pub fn key(&self) -> &PKeyRef<Private> {
        &self.key
    }

    /// The JWS algorithm the account key signs with (`ES256`, `ES384`, `ES512` or `RS256`).
    pub fn jws_alg(&self) -> &'static str {
        self.alg
    }

    /// The public key as a JWK.
    pub fn jwk(&self) -> &Jwk {
        &self.jwk
    }

    /// The RFC 7638 thumbprint of the account public key.
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    /// The account URL, once registration assigned one.
    pub fn kid(&self) -> Option<&str> {
        self.kid.get().map(String::as_str)
    }

    /// The contact entries this account registers with.
    pub fn contacts(&self) -> &[String] {
        &self.contacts
    }

    /// Whether the account agrees to the CA's terms of service.
    pub fn tos_agreed(&self) -> bool {
        self.tos_agreed
    }

    /// The configured External Account Binding credentials.
    pub fn eab(&self) -> Option<&EabCredentials> {
        self.eab.as_ref()
    }

    pub(crate) fn store_kid(&self, kid: String) {
        // losing the race means another task registered the same instance; both used the same
        // key so both got the same account URL back
        let _ = self.kid.set(kid);
    }

    /// The nonce namespace of this account against `directory_url`: the plain directory URL
    /// before registration, extended with the kid afterwards so accounts never share nonces.
    pub(crate) fn nonce_namespace(&self, directory_url: &str) -> String {
        match self.kid() {
            Some(kid) => format!("{}#{}", directory_url, kid),
            None => directory_url.to_string(),
        }
    }

    /// Sign a JWS for `url`. Identity is chosen by registration state: `kid` once assigned,
    /// the embedded JWK before (which is exactly the `newAccount` case).
    pub(crate) fn sign(
        &self,
        url: &str,
        nonce: String,
        payload: Option<&serde_json::Value>,
    ) -> Result<Jws, Error> {
        let payload = match payload {
            Some(value) => acme_core::b64u_encode(serde_json::to_string(value)
                .map_err(|err| Error::Protocol(err.to_string()))?
                .as_bytes()),
            None => String::new(),
        };
        Ok(Jws::new_full_with_jwk(
            &self.key,
            &self.jwk,
            self.kid().map(str::to_owned),
            url.to_string(),
            nonce,
            payload,
        )?)
    }

    /// Get the "key authorization" for a token (RFC 8555 §8.1).
    pub fn key_authorization(&self, token: &str) -> String {
        format!("{}.{}", token, self.thumbprint)
    }

    /// Get the TXT field value for a dns-01 token. This is the base64url encoded sha256
    /// digest of the key authorization value.
    pub fn dns_01_txt_value(&self, token: &str) -> String {
        key::dns_01_txt_value(&self.key_authorization(token))
    }
}

/// Builder for an [`Account`], in charge of key generation and contact data.
#[derive(Default)]
pub struct AccountBuilder {
    contacts: Vec<String>,
    tos_agreed: bool,
    eab: Option<EabCredentials>,
    key: Option<PKey<Private>>,
    algorithm: KeyAlgorithm,
}

impl AccountBuilder {
    /// Replace the contact info with the provided ACME compatible data.
    pub fn set_contacts(mut self, contacts: Vec<String>) -> Self {
        self.contacts = contacts;
        self
    }

    /// Append a contact string.
    pub fn contact(mut self, contact: String) -> Self {
        self.contacts.push(contact);
        self
    }

    /// Append an email address to the contact list.
    pub fn email(self, email: String) -> Self {
        self.contact(format!("mailto:{}", email))
    }

    /// Change whether the account agrees to the terms of service. Use
    /// [`Client::terms_of_service_url`](crate::Client::terms_of_service_url) to present the
    /// user with the Terms of Service.
    pub fn agree_to_tos(mut self, agree: bool) -> Self {
        self.tos_agreed = agree;
        self
    }

    /// Set the EAB credentials for the account registration.
    pub fn eab_credentials(mut self, kid: String, hmac_key: &str) -> Result<Self, Error> {
        self.eab = Some(EabCredentials::new(kid, hmac_key)?);
        Ok(self)
    }

    /// Key generation parameters used by [`build`](AccountBuilder::build) when no key is
    /// supplied. Defaults to EC P-256.
    pub fn algorithm(mut self, algorithm: KeyAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Use an existing key instead of generating one. EC P-256/P-384/P-521 and RSA
    /// 2048/3072/4096 keys are supported.
    pub fn with_key(mut self, key: PKey<Private>) -> Self {
        self.key = Some(key);
        self
    }

    /// Finish the account, generating a key pair if none was supplied.
    pub fn build(self) -> Result<Account, Error> {
        let key = match self.key {
            Some(key) => key,
            None => self.algorithm.generate()?,
        };

        let jwk = Jwk::try_from(&*key)?;
        let alg = jwk.key.jws_alg();
        let thumbprint = jwk.thumbprint()?;

        Ok(Account {
            key,
            jwk,
            alg,
            thumbprint,
            contacts: self.contacts,
            tos_agreed: self.tos_agreed,
            eab: self.eab,
            kid: OnceLock::new(),
            registration: tokio::sync::Mutex::new(()),
        })
    }
}

#[cfg(test)]
mod test {
    use acme_core::key::{EcCurve, KeyAlgorithm};

    use super::Account;

    #[test]
    fn alg_is_derived_once_from_the_key() {
        let account = Account::builder()
            .algorithm(KeyAlgorithm::Ec(EcCurve::P384))
            .build()
            .unwrap();
        assert_eq!(account.jws_alg(), "ES384");
        assert_eq!(account.thumbprint().len(), 43);
    }

    #[test]
    fn kid_is_write_once() {
        let account = Account::builder().build().unwrap();
        assert_eq!(account.kid(), None);
        account.store_kid("https://ca.example/acct/1".to_string());
        account.store_kid("https://ca.example/acct/2".to_string());
        assert_eq!(account.kid(), Some("https://ca.example/acct/1"));
    }

    #[test]
    fn namespace_follows_registration_state() {
        let account = Account::builder().build().unwrap();
        let dir = "https://ca.example/directory";
        assert_eq!(account.nonce_namespace(dir), dir);
        account.store_kid("https://ca.example/acct/7".to_string());
        assert_eq!(
            account.nonce_namespace(dir),
            "https://ca.example/directory#https://ca.example/acct/7"
        );
    }

    #[test]
    fn key_authorization_uses_cached_thumbprint() {
        let account = Account::builder().build().unwrap();
        let token = "evaGxfADs6pSRb2LAv9IZf17Dt3juxGJ-PCt92wr-oA";
        let key_auth = account.key_authorization(token);
        assert_eq!(
            key_auth,
            format!("{}.{}", token, account.thumbprint())
        );
        let txt = account.dns_01_txt_value(token);
        assert_eq!(txt.len(), 43);
        assert!(txt.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
