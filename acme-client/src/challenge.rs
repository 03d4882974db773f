//! The generic challenge solving loop for dns-01 and http-01.
//!
//! Publishing the proof and waiting for it to propagate are the caller's problem, supplied as
//! two async hooks; the solver drives everything else: fetching authorizations, computing key
//! authorizations, submitting challenges and polling the order.

use std::future::Future;

use serde_json::json;

use acme_core::authorization::{self, Authorization, ChallengeStatus, ChallengeType};
use acme_core::order::Status;
use acme_core::Order;

use crate::account::Account;
use crate::client::Client;
use crate::error::Error;

/// What a caller must publish for one challenge.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChallengeRecord {
    /// The challenge type this record belongs to.
    pub challenge_type: ChallengeType,

    /// The identifier being proven.
    pub identifier: String,

    /// Where the proof must appear: the TXT record name for dns-01
    /// (`_acme-challenge.<identifier>`), the well-known URL for http-01.
    pub target: String,

    /// The exact value that must be served: the TXT value for dns-01, the key authorization
    /// for http-01.
    pub value: String,
}

impl ChallengeRecord {
    fn dns01(identifier: &str, account: &Account, token: &str) -> Self {
        Self {
            challenge_type: ChallengeType::Dns01,
            identifier: identifier.to_string(),
            target: format!("_acme-challenge.{}", identifier),
            value: account.dns_01_txt_value(token),
        }
    }

    fn http01(identifier: &str, account: &Account, token: &str) -> Self {
        Self {
            challenge_type: ChallengeType::Http01,
            identifier: identifier.to_string(),
            target: format!(
                "http://{}/.well-known/acme-challenge/{}",
                identifier, token
            ),
            value: account.key_authorization(token),
        }
    }

    fn build(
        ty: ChallengeType,
        identifier: &str,
        account: &Account,
        token: &str,
    ) -> Result<Self, Error> {
        match ty {
            ChallengeType::Dns01 => Ok(Self::dns01(identifier, account, token)),
            ChallengeType::Http01 => Ok(Self::http01(identifier, account, token)),
            _ => Err(Error::Protocol(format!(
                "no solver for challenge type {:?}",
                ty
            ))),
        }
    }
}

fn type_tag(ty: ChallengeType) -> &'static str {
    match ty {
        ChallengeType::Http01 => "http-01",
        ChallengeType::Dns01 => "dns-01",
        ChallengeType::TlsAlpn01 => "tls-alpn-01",
        ChallengeType::Unknown => "unknown",
    }
}

impl Client {
    /// Solve every authorization of `order` over dns-01.
    ///
    /// For each identifier, `provision` is invoked with the TXT record to publish and
    /// `wait_for` must block until authoritative DNS serves it; then the CA is told to
    /// validate. Returns the order once it reaches `ready` (or `valid`).
    pub async fn solve_dns01<P, PF, W, WF>(
        &self,
        account: &Account,
        order: &Order,
        provision: P,
        wait_for: W,
    ) -> Result<Order, Error>
    where
        P: Fn(ChallengeRecord) -> PF,
        PF: Future<Output = Result<(), Error>>,
        W: Fn(ChallengeRecord) -> WF,
        WF: Future<Output = Result<(), Error>>,
    {
        self.solve_challenges(account, order, ChallengeType::Dns01, provision, wait_for)
            .await
    }

    /// Solve every authorization of `order` over http-01.
    ///
    /// `provision` receives the well-known URL and the key authorization body to serve;
    /// `wait_for` must block until the file is reachable.
    pub async fn solve_http01<P, PF, W, WF>(
        &self,
        account: &Account,
        order: &Order,
        provision: P,
        wait_for: W,
    ) -> Result<Order, Error>
    where
        P: Fn(ChallengeRecord) -> PF,
        PF: Future<Output = Result<(), Error>>,
        W: Fn(ChallengeRecord) -> WF,
        WF: Future<Output = Result<(), Error>>,
    {
        self.solve_challenges(account, order, ChallengeType::Http01, provision, wait_for)
            .await
    }

    /// The shared loop. Authorizations are processed sequentially so failures surface with a
    /// deterministic per-identifier order; callers wanting concurrency get it inside their
    /// own hooks.
    async fn solve_challenges<P, PF, W, WF>(
        &self,
        account: &Account,
        order: &Order,
        ty: ChallengeType,
        provision: P,
        wait_for: W,
    ) -> Result<Order, Error>
    where
        P: Fn(ChallengeRecord) -> PF,
        PF: Future<Output = Result<(), Error>>,
        W: Fn(ChallengeRecord) -> WF,
        WF: Future<Output = Result<(), Error>>,
    {
        self.ensure_registered(account).await?;

        for auth_url in &order.data.authorizations {
            let auth: Authorization = self.get_authorization(account, auth_url).await?;
            let identifier = auth.identifier.value().to_string();

            // surface any failed challenge before looking at the authorization state, the
            // CA's error is more specific than "invalid"
            for challenge in &auth.challenges {
                if challenge.error.is_some() || challenge.status == ChallengeStatus::Invalid {
                    return Err(Error::ChallengeInvalid {
                        identifier,
                        problem: challenge.error.clone(),
                    });
                }
            }

            match auth.status {
                authorization::Status::Valid => {
                    tracing::debug!(identifier = %identifier, "authorization already valid");
                    continue;
                }
                authorization::Status::Pending => {}
                status => {
                    return Err(Error::AuthorizationFailed { identifier, status });
                }
            }

            let challenge = auth.challenge(ty).ok_or_else(|| Error::ChallengeNotFound {
                identifier: identifier.clone(),
                challenge_type: type_tag(ty),
            })?;

            if challenge.status == ChallengeStatus::Processing {
                tracing::debug!(identifier = %identifier, "challenge already processing, not resubmitting");
                continue;
            }

            let token = challenge
                .token()
                .ok_or_else(|| Error::InvalidApi("challenge carries no token".to_string()))?;

            let record = ChallengeRecord::build(ty, &identifier, account, token)?;
            tracing::info!(
                identifier = %identifier,
                target = %record.target,
                "provisioning {} challenge",
                type_tag(ty)
            );

            provision(record.clone()).await?;
            wait_for(record).await?;

            // an empty JSON object tells the CA to start validating
            let response = self
                .signed_post(account, &challenge.url, Some(&json!({})))
                .await?;
            if !response.is_success() {
                return Err(Error::from_response(&challenge.url, &response));
            }
            tracing::info!(identifier = %identifier, "challenge submitted for validation");
        }

        self.wait_order(account, order, &[Status::Ready, Status::Valid])
            .await
    }
}

#[cfg(test)]
mod test {
    use acme_core::authorization::ChallengeType;

    use crate::account::Account;

    use super::ChallengeRecord;

    #[test]
    fn dns01_record_shape() {
        let account = Account::builder().build().unwrap();
        let token = "evaGxfADs6pSRb2LAv9IZf17Dt3juxGJ-PCt92wr-oA";
        let record = ChallengeRecord::build(ChallengeType::Dns01, "example.com", &account, token)
            .unwrap();

        assert_eq!(record.target, "_acme-challenge.example.com");
        assert_eq!(record.value, account.dns_01_txt_value(token));
        assert_eq!(record.value.len(), 43);
        assert!(record.value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn http01_record_shape() {
        let account = Account::builder().build().unwrap();
        let token = "tok";
        let record = ChallengeRecord::build(ChallengeType::Http01, "example.com", &account, token)
            .unwrap();

        assert_eq!(
            record.target,
            "http://example.com/.well-known/acme-challenge/tok"
        );
        assert_eq!(record.value, account.key_authorization(token));
        assert!(record.value.starts_with("tok."));
    }

    #[test]
    fn unsupported_types_are_refused() {
        let account = Account::builder().build().unwrap();
        assert!(
            ChallengeRecord::build(ChallengeType::TlsAlpn01, "example.com", &account, "t").is_err()
        );
    }
}
