use std::collections::HashMap;

use anyhow::{format_err, Context as _, Error};
use http::{HeaderValue, Request};
use hyper::client::Client as HyperClient;
use hyper::client::HttpConnector;
use hyper::Body as HyperBody;
use openssl::ssl::{SslConnector, SslMethod};

use crate::{HttpOptions, HttpsConnector, Response};

/// Asynchronous HTTP client for the ACME wire protocol.
///
/// Connections are pooled by hyper, so one client can serve many concurrent requests. The
/// contract towards the protocol engine is narrow: a request either yields a [`Response`]
/// (whatever its status code) or fails with a transport, timeout or decode error.
pub struct HttpClient {
    client: HyperClient<HttpsConnector, HyperBody>,
    options: HttpOptions,
}

impl HttpClient {
    /// Create a client with default options.
    pub fn new() -> Self {
        Self::with_options(HttpOptions::default())
    }

    /// Create a client with the given options.
    pub fn with_options(options: HttpOptions) -> Self {
        let ssl_connector = SslConnector::builder(SslMethod::tls())
            .expect("failed to create openssl TLS context")
            .build();
        let connector = HttpsConnector::with_connector(
            HttpConnector::new(),
            ssl_connector,
            options.tcp_keepalive.unwrap_or(7200),
        );
        let client = HyperClient::builder().build(connector);
        Self { client, options }
    }

    /// Issue a `GET` request.
    pub async fn get(
        &self,
        uri: &str,
        extra_headers: Option<&HashMap<String, String>>,
    ) -> Result<Response, Error> {
        self.request_with_headers("GET", uri, None, extra_headers)
            .await
    }

    /// Issue a `HEAD` request.
    pub async fn head(
        &self,
        uri: &str,
        extra_headers: Option<&HashMap<String, String>>,
    ) -> Result<Response, Error> {
        self.request_with_headers("HEAD", uri, None, extra_headers)
            .await
    }

    /// Issue a `POST` request with an optional body and content type.
    pub async fn post(
        &self,
        uri: &str,
        body: Option<String>,
        content_type: Option<&str>,
        extra_headers: Option<&HashMap<String, String>>,
    ) -> Result<Response, Error> {
        self.request_with_headers("POST", uri, body.map(|b| (b, content_type)), extra_headers)
            .await
    }

    async fn request_with_headers(
        &self,
        method: &'static str,
        uri: &str,
        body: Option<(String, Option<&str>)>,
        extra_headers: Option<&HashMap<String, String>>,
    ) -> Result<Response, Error> {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(extra_headers) = extra_headers {
            for (header, value) in extra_headers {
                builder = builder.header(header.as_str(), value.as_str());
            }
        }

        let request = match body {
            Some((body, content_type)) => builder
                .header(
                    http::header::CONTENT_TYPE,
                    content_type.unwrap_or("application/json"),
                )
                .header(http::header::CONTENT_LENGTH, body.len())
                .body(HyperBody::from(body)),
            None => builder.body(HyperBody::empty()),
        }
        .map_err(|err| format_err!("failed to build {} request to {}: {}", method, uri, err))?;

        self.request(request).await
    }

    /// Issue a prebuilt request, adding the default `User-Agent` when absent.
    pub async fn request(&self, mut request: Request<HyperBody>) -> Result<Response, Error> {
        if !request.headers().contains_key(http::header::USER_AGENT) {
            request.headers_mut().insert(
                http::header::USER_AGENT,
                HeaderValue::from_str(self.options.user_agent())?,
            );
        }

        let method = request.method().clone();
        let uri = request.uri().clone();

        tracing::debug!(%method, %uri, "http request");

        let exchange = async {
            let response = self
                .client
                .request(request)
                .await
                .with_context(|| format!("{} {} failed", method, uri))?;

            let (parts, body) = response.into_parts();
            let body = hyper::body::to_bytes(body)
                .await
                .with_context(|| format!("failed to read response body of {}", uri))?;

            Response::new(parts.status.as_u16(), parts.headers, body.to_vec())
        };

        let response = tokio::time::timeout(self.options.request_timeout, exchange)
            .await
            .map_err(|_| {
                format_err!(
                    "request to {} timed out after {:?}",
                    uri,
                    self.options.request_timeout
                )
            })??;

        tracing::debug!(%uri, status = response.status, "http response");

        Ok(response)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}
