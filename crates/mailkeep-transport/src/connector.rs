//! Opening connections.
//!
//! Protocol clients never open sockets themselves: they ask a [`Connector`].
//! Production code uses [`TcpConnector`]; tests hand the client a connector
//! that returns scripted in-memory streams.

use std::future::Future;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::debug;

use crate::config::ServerConfig;
use crate::stream::MailStream;
use crate::transport::Transport;
use crate::{Error, Result};

/// Source of connections to mail servers.
pub trait Connector: Send + Sync {
    /// Stream type produced by this connector.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Opens a connection to the configured server.
    ///
    /// Implicit TLS is negotiated before this returns.
    fn connect(
        &self,
        config: &ServerConfig,
    ) -> impl Future<Output = Result<Transport<Self::Stream>>> + Send;

    /// Upgrades an open plaintext connection to TLS (STARTTLS).
    fn upgrade(
        &self,
        transport: Transport<Self::Stream>,
        host: &str,
    ) -> impl Future<Output = Result<Transport<Self::Stream>>> + Send;
}

/// Connector that opens real TCP sockets, with TLS via rustls.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = MailStream;

    async fn connect(&self, config: &ServerConfig) -> Result<Transport<MailStream>> {
        debug!(
            host = %config.host,
            port = config.port,
            security = ?config.security,
            "opening connection"
        );
        let stream = timeout(config.connect_timeout, MailStream::open(config))
            .await
            .map_err(|_| Error::Timeout(config.connect_timeout))??;
        Ok(Transport::with_io_timeout(stream, config.io_timeout))
    }

    async fn upgrade(
        &self,
        transport: Transport<MailStream>,
        host: &str,
    ) -> Result<Transport<MailStream>> {
        let (stream, io_timeout) = transport.into_parts();
        let stream = timeout(io_timeout, stream.upgrade_to_tls(host))
            .await
            .map_err(|_| Error::Timeout(io_timeout))??;
        debug!(host, "connection upgraded to TLS");
        Ok(Transport::with_io_timeout(stream, io_timeout))
    }
}
