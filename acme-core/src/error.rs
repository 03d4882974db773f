//! The `Error` type for protocol-level failures.

use std::fmt;

use openssl::error::ErrorStack as SslErrorStack;

/// Error types returned by this crate.
#[derive(Debug)]
#[must_use = "unused errors have no effect"]
pub enum Error {
    /// Tried to sign without a private key.
    MissingKey,

    /// Tried to build a CSR or order without a single identifier.
    EmptyIdentifiers,

    /// A raw `openssl::PKey` containing an unsupported key was passed.
    UnsupportedKeyType,

    /// A raw `openssl::PKey` or `openssl::EcKey` with an unsupported curve was passed.
    UnsupportedGroup,

    /// An RSA key size outside of 2048/3072/4096 was requested.
    UnsupportedKeySize(u32),

    /// An openssl error occurred during a crypto operation.
    RawSsl(SslErrorStack),

    /// An openssl error occurred during a crypto operation.
    /// With some textual context.
    Ssl(&'static str, SslErrorStack),

    /// An otherwise uncaught serde error happened.
    Json(serde_json::Error),

    /// Failed to decode base64(url) data.
    BadBase64(base64::DecodeError),

    /// A non-openssl error occurred while building data for the CSR.
    Csr(String),

    /// Can be used by the user for textual error messages without having to downcast to
    /// protocol errors.
    Custom(String),
}

impl Error {
    /// Create an `Error` from a custom text.
    pub fn custom<T: fmt::Display>(s: T) -> Self {
        Error::Custom(s.to_string())
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::MissingKey => f.write_str("cannot sign without a private key"),
            Error::EmptyIdentifiers => f.write_str("at least one identifier is required"),
            Error::UnsupportedKeyType => f.write_str("unsupported key type"),
            Error::UnsupportedGroup => f.write_str("unsupported EC group"),
            Error::UnsupportedKeySize(bits) => {
                write!(f, "unsupported RSA key size: {} bits", bits)
            }
            Error::RawSsl(err) => fmt::Display::fmt(err, f),
            Error::Ssl(context, err) => write!(f, "{}: {}", context, err),
            Error::Json(err) => fmt::Display::fmt(err, f),
            Error::BadBase64(err) => fmt::Display::fmt(err, f),
            Error::Csr(err) => fmt::Display::fmt(err, f),
            Error::Custom(err) => fmt::Display::fmt(err, f),
        }
    }
}

impl From<SslErrorStack> for Error {
    fn from(e: SslErrorStack) -> Self {
        Error::RawSsl(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::BadBase64(e)
    }
}
