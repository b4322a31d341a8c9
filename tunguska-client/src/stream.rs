//! Socket stream abstraction for TLS and plain TCP.

use crate::error::ClientError;
use crate::socket::SocketConfig;
use crate::tls::{create_insecure_tls_connector, create_tls_connector};
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream as ClientTlsStream;

pin_project! {
    /// A backend stream that can be either plain TCP or TLS.
    #[project = SocketStreamProj]
    pub enum SocketStream {
        Plain { #[pin] stream: TcpStream },
        Tls { #[pin] stream: ClientTlsStream<TcpStream> },
    }
}

impl SocketStream {
    /// Opens a TCP connection to the configured backend and upgrades
    /// to TLS when enabled.
    pub async fn connect(config: &SocketConfig) -> Result<Self, ClientError> {
        tracing::debug!(host = %config.host, port = config.port, "connecting");

        let tcp_stream = tokio::time::timeout(
            config.connect_timeout,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        .map_err(|_| ClientError::Timeout)?
        .map_err(ClientError::Io)?;

        tcp_stream.set_nodelay(true).ok();

        if !config.use_tls {
            return Ok(SocketStream::Plain { stream: tcp_stream });
        }

        let (connector, server_name) = if config.insecure {
            tracing::warn!("TLS certificate verification disabled");
            create_insecure_tls_connector(config)?
        } else {
            create_tls_connector(config)?
        };

        let tls_stream = connector
            .connect(server_name, tcp_stream)
            .await
            .map_err(|e| ClientError::TlsHandshake(e.to_string()))?;

        tracing::debug!("TLS handshake complete");
        Ok(SocketStream::Tls { stream: tls_stream })
    }

    /// Returns whether this stream is TLS-encrypted.
    pub fn is_tls(&self) -> bool {
        matches!(self, SocketStream::Tls { .. })
    }
}

impl AsyncRead for SocketStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project() {
            SocketStreamProj::Plain { stream } => stream.poll_read(cx, buf),
            SocketStreamProj::Tls { stream } => stream.poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SocketStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.project() {
            SocketStreamProj::Plain { stream } => stream.poll_write(cx, buf),
            SocketStreamProj::Tls { stream } => stream.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            SocketStreamProj::Plain { stream } => stream.poll_flush(cx),
            SocketStreamProj::Tls { stream } => stream.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            SocketStreamProj::Plain { stream } => stream.poll_shutdown(cx),
            SocketStreamProj::Tls { stream } => stream.poll_shutdown(cx),
        }
    }
}
