//! The engine's error taxonomy.
//!
//! Variants are kinds, not wrappers: protocol failures carry the classified problem document,
//! operational failures carry what a caller needs to react (endpoint, attempts, statuses).
//! Everything is `Clone` so a single failure can be fanned out to all nonce-pool waiters.

use std::time::Duration;

use acme_core::authorization;
use acme_core::order;
use acme_core::{Problem, ProblemKind};
use acme_http::Response;

/// Any failure an ACME operation can surface.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    /// The request never produced a usable response: connect/DNS/TLS failure, timeout or a
    /// body that could not be decoded.
    #[error("transport error: {message}")]
    Transport {
        /// Rendered cause chain of the underlying failure.
        message: String,
    },

    /// The server answered with an RFC 7807 problem document.
    #[error("{problem}")]
    Acme {
        /// The classified problem type.
        kind: ProblemKind,
        /// The full problem document, subproblems included.
        problem: Problem,
        /// The request URL which produced the problem.
        url: Option<String>,
    },

    /// An error status without a problem document.
    #[error("unexpected status {status} from {url}")]
    HttpStatus {
        /// The request URL.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// `Retry-After` of the response, in seconds, if it carried one.
        retry_after: Option<u64>,
    },

    /// The server violated the ACME protocol (missing headers, malformed resources).
    #[error("ACME server misbehaved: {0}")]
    InvalidApi(String),

    /// A key, signing or CSR operation failed.
    #[error("{0}")]
    Protocol(String),

    /// No nonce could be produced for a waiting request in time.
    #[error("no nonce became available within {timeout:?}")]
    NonceTimeout {
        /// The configured waiter timeout.
        timeout: Duration,
    },

    /// A `newNonce` response carried no `Replay-Nonce` header.
    #[error("response from {url} carried no Replay-Nonce header")]
    NonceNoHeader {
        /// The newNonce URL.
        url: String,
    },

    /// Retries against one endpoint were exhausted.
    #[error("rate limit exceeded for {endpoint} after {attempts} attempts")]
    RateLimitExceeded {
        /// The logical endpoint that kept failing.
        endpoint: String,
        /// Total attempts made.
        attempts: u32,
        /// The last `Retry-After` the server sent, in seconds.
        retry_after: Option<u64>,
    },

    /// An order did not reach a target state within the polling budget.
    #[error("order {url} did not settle after {attempts} polls")]
    OrderTimeout {
        /// The order URL.
        url: String,
        /// Polls performed.
        attempts: u32,
    },

    /// The order moved to `invalid`.
    #[error("order {url} became invalid")]
    OrderInvalid {
        /// The order URL.
        url: String,
        /// The error the CA attached to the order, if any.
        problem: Option<Problem>,
    },

    /// Finalization was attempted before the order reached `ready`.
    #[error("order is not ready for finalization (status: {status:?})")]
    OrderNotReady {
        /// The status the order was actually in.
        status: order::Status,
    },

    /// An authorization is in a state that cannot be solved anymore.
    #[error("authorization for {identifier} is {status:?}")]
    AuthorizationFailed {
        /// The identifier the authorization belongs to.
        identifier: String,
        /// Its state (invalid, expired, revoked or deactivated).
        status: authorization::Status,
    },

    /// No challenge of the requested type was offered.
    #[error("no {challenge_type} challenge offered for {identifier}")]
    ChallengeNotFound {
        /// The identifier whose authorization lacked the type.
        identifier: String,
        /// The challenge type that was requested.
        challenge_type: &'static str,
    },

    /// A challenge failed validation.
    #[error("challenge for {identifier} failed")]
    ChallengeInvalid {
        /// The identifier the challenge belongs to.
        identifier: String,
        /// The validation error the CA recorded, subproblems preserved.
        problem: Option<Problem>,
    },

    /// The operation was cancelled, typically by [`NoncePool::clear`](crate::NoncePool::clear).
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// A resource creation response was missing its `Location` header.
    #[error("response from {url} carried no Location header")]
    MissingLocation {
        /// The request URL.
        url: String,
    },
}

impl Error {
    /// Build the error for a non-success response: the classified problem document when the
    /// response carries one, a plain status error otherwise.
    pub(crate) fn from_response(url: &str, response: &Response) -> Self {
        let retry_after = response
            .retry_after()
            .and_then(crate::rate_limit::parse_retry_after);

        if response.is_problem() {
            if let Ok(mut problem) = response.json::<Problem>() {
                if problem.status.is_none() {
                    problem.status = Some(response.status);
                }
                if problem.retry_after.is_none() {
                    problem.retry_after = retry_after;
                }
                return Error::Acme {
                    kind: problem.kind(),
                    problem,
                    url: Some(url.to_string()),
                };
            }
        }

        Error::HttpStatus {
            url: url.to_string(),
            status: response.status,
            retry_after,
        }
    }

    /// The HTTP status this error was born from, when one exists.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Error::Acme { problem, .. } => problem.status,
            Error::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this is the `badNonce` problem, handled by silent retry in the nonce layer.
    pub fn is_bad_nonce(&self) -> bool {
        matches!(self, Error::Acme { kind: ProblemKind::BadNonce, .. })
    }

    /// Seconds the server asked us to wait, from either the `Retry-After` header or the
    /// problem document.
    pub(crate) fn retry_after_hint(&self) -> Option<u64> {
        match self {
            Error::Acme { kind, problem, .. } => match kind {
                ProblemKind::RateLimited { retry_after } => retry_after.or(problem.retry_after),
                _ => problem.retry_after,
            },
            Error::HttpStatus { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<acme_core::Error> for Error {
    fn from(err: acme_core::Error) -> Self {
        Error::Protocol(err.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Transport {
            message: format!("{:#}", err),
        }
    }
}
