use anyhow::{format_err, Error};
use http::HeaderMap;
use serde::Deserialize;
use serde_json::Value;

/// A response body, decoded according to the `Content-Type` of the response.
#[derive(Clone, Debug)]
pub enum Body {
    /// `application/json` and `application/problem+json` bodies, parsed.
    Json(Value),
    /// `text/*` and `application/pem-certificate-chain` bodies.
    Text(String),
    /// Anything else, as raw bytes. Empty bodies end up here too.
    Binary(Vec<u8>),
}

/// An HTTP response with its status, all headers and the decoded body.
///
/// A `Response` exists for *every* exchange that reached the server, error statuses included;
/// the transport layer never interprets the status code.
#[derive(Clone, Debug)]
pub struct Response {
    /// The HTTP status code.
    pub status: u16,

    /// All response headers. Lookup through [`http::HeaderMap`] is case-insensitive and
    /// multi-valued headers are kept.
    pub headers: HeaderMap,

    /// The decoded body.
    pub body: Body,
}

impl Response {
    /// Assemble a response, decoding the raw body according to the `Content-Type` header.
    ///
    /// Fails only when the body contradicts its declared content type.
    pub fn new(status: u16, headers: HeaderMap, raw: Vec<u8>) -> Result<Self, Error> {
        let content_type = headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                v.split(';')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_ascii_lowercase()
            })
            .unwrap_or_default();

        let body = match content_type.as_str() {
            "application/json" | "application/problem+json" => {
                if raw.is_empty() {
                    Body::Binary(raw)
                } else {
                    Body::Json(serde_json::from_slice(&raw).map_err(|err| {
                        format_err!("invalid json response body ({}): {}", content_type, err)
                    })?)
                }
            }
            "application/pem-certificate-chain" => Body::Text(decode_text(raw)?),
            ty if ty.starts_with("text/") => Body::Text(decode_text(raw)?),
            _ => Body::Binary(raw),
        };

        Ok(Self {
            status,
            headers,
            body,
        })
    }

    /// Check the HTTP status code for a success code (200..299).
    pub fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Whether the response declared itself an RFC 7807 problem document.
    pub fn is_problem(&self) -> bool {
        self.header("content-type")
            .map(|v| {
                v.split(';').next().unwrap_or_default().trim()
                    == "application/problem+json"
            })
            .unwrap_or(false)
    }

    /// Get a header value as a string, if present and representable as one.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get the `Location` header.
    pub fn location(&self) -> Option<&str> {
        self.header("location")
    }

    /// Get the `Replay-Nonce` header.
    pub fn replay_nonce(&self) -> Option<&str> {
        self.header("replay-nonce")
    }

    /// Get the `Retry-After` header, unparsed.
    pub fn retry_after(&self) -> Option<&str> {
        self.header("retry-after")
    }

    /// Deserialize a JSON body. Fails when the response was not JSON.
    pub fn json<T: for<'a> Deserialize<'a>>(&self) -> Result<T, Error> {
        match &self.body {
            Body::Json(value) => Ok(serde_json::from_value(value.clone())?),
            _ => Err(format_err!(
                "expected a json response body (status {})",
                self.status
            )),
        }
    }

    /// Access a text body.
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            Body::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Access the body as bytes, whatever its decoded form.
    pub fn bytes(&self) -> Vec<u8> {
        match &self.body {
            Body::Json(value) => value.to_string().into_bytes(),
            Body::Text(text) => text.clone().into_bytes(),
            Body::Binary(bytes) => bytes.clone(),
        }
    }
}

fn decode_text(raw: Vec<u8>) -> Result<String, Error> {
    String::from_utf8(raw).map_err(|err| format_err!("response body is not valid utf-8: {}", err))
}
