use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use hyper::client::connect::{Connected, Connection};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_openssl::SslStream;

trait RawIo: AsyncRead + AsyncWrite + Send {}

impl<S: AsyncRead + AsyncWrite + Send> RawIo for S {}

/// One established client connection, with or without TLS in between.
///
/// The connector has to hand hyper a single concrete type for both `http` and `https`
/// targets, so the actual transport is erased behind a pinned box. ACME traffic is a handful
/// of small requests per order; the indirection is not worth avoiding here.
pub struct ConnStream {
    io: Pin<Box<dyn RawIo>>,
}

impl ConnStream {
    pub(crate) fn plain(socket: TcpStream) -> Self {
        Self {
            io: Box::pin(socket),
        }
    }

    pub(crate) fn tls(secured: SslStream<TcpStream>) -> Self {
        Self {
            io: Box::pin(secured),
        }
    }
}

impl AsyncRead for ConnStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.get_mut().io.as_mut().poll_read(cx, buf)
    }
}

impl AsyncWrite for ConnStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.get_mut().io.as_mut().poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().io.as_mut().poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().io.as_mut().poll_shutdown(cx)
    }
}

impl Connection for ConnStream {
    fn connected(&self) -> Connected {
        // nothing special to report: no proxying, no negotiated h2
        Connected::new()
    }
}
