use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use anyhow::format_err;
use http::uri::Scheme;
use http::Uri;
use hyper::client::connect::HttpConnector;
use hyper::service::Service;
use openssl::ssl::SslConnector;
use tokio_openssl::SslStream;

use crate::ConnStream;

/// An `https` capable connector for `hyper` built on top of its plain [`HttpConnector`],
/// wrapping connections in openssl TLS when the scheme asks for it.
#[derive(Clone)]
pub struct HttpsConnector {
    connector: HttpConnector,
    ssl_connector: Arc<SslConnector>,
}

impl HttpsConnector {
    /// Combine a TCP connector and an SSL connector.
    pub fn with_connector(
        mut connector: HttpConnector,
        ssl_connector: SslConnector,
        tcp_keepalive: u32,
    ) -> Self {
        connector.set_nodelay(true);
        connector.set_keepalive(Some(std::time::Duration::from_secs(tcp_keepalive.into())));
        connector.enforce_http(false);
        Self {
            connector,
            ssl_connector: Arc::new(ssl_connector),
        }
    }
}

type ConnectorError = Box<dyn std::error::Error + Send + Sync>;

impl Service<Uri> for HttpsConnector {
    type Response = ConnStream;
    type Error = ConnectorError;
    #[allow(clippy::type_complexity)]
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.connector.poll_ready(cx).map_err(|err| err.into())
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let mut connector = self.connector.clone();
        let ssl_connector = Arc::clone(&self.ssl_connector);
        let is_https = dst.scheme() == Some(&Scheme::HTTPS);
        let host = dst.host().map(str::to_owned);

        Box::pin(async move {
            let host = host.ok_or_else(|| format_err!("missing URL authority"))?;
            let conn = connector.call(dst).await?;

            if !is_https {
                return Ok(ConnStream::plain(conn));
            }

            let ssl = ssl_connector.configure()?.into_ssl(&host)?;
            let mut stream = SslStream::new(ssl, conn)?;
            Pin::new(&mut stream)
                .connect()
                .await
                .map_err(|err| format_err!("TLS handshake with {} failed: {}", host, err))?;
            Ok(ConnStream::tls(stream))
        })
    }
}
