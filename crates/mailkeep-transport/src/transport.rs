//! Timed send/receive over a byte stream.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::config::DEFAULT_IO_TIMEOUT;
use crate::stream::MailStream;
use crate::{Error, Result};

/// Largest single read issued by [`Transport::receive_some`].
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Initial capacity of the reusable read buffer.
const READ_BUFFER_SIZE: usize = 8192;

/// Bytes returned by one [`Transport::receive`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    /// Data read from the peer.
    pub data: Bytes,
    /// True if the peer closed its side of the connection.
    pub is_complete: bool,
}

/// One connection to a mail server.
///
/// Every read and write is bounded by the I/O timeout. Nothing is retried at
/// this layer.
#[derive(Debug)]
pub struct Transport<S = MailStream> {
    stream: S,
    io_timeout: Duration,
    read_buffer: BytesMut,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a stream with the default I/O timeout.
    pub fn new(stream: S) -> Self {
        Self::with_io_timeout(stream, DEFAULT_IO_TIMEOUT)
    }

    /// Wraps a stream with the given I/O timeout.
    pub fn with_io_timeout(stream: S, io_timeout: Duration) -> Self {
        Self {
            stream,
            io_timeout,
            read_buffer: BytesMut::with_capacity(READ_BUFFER_SIZE),
        }
    }

    /// Writes all of `data` and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or exceeds the I/O timeout.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        let limit = self.io_timeout;
        let stream = &mut self.stream;
        timeout(limit, async {
            stream.write_all(data).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| Error::Timeout(limit))??;
        Ok(())
    }

    /// Reads at least `min` and at most `max` bytes.
    ///
    /// Returns early with `is_complete` set if the peer closes the
    /// connection; the data read so far is still returned.
    ///
    /// # Errors
    ///
    /// Returns an error if a read fails or exceeds the I/O timeout.
    pub async fn receive(&mut self, min: usize, max: usize) -> Result<Received> {
        let max = max.max(1);
        let min = min.clamp(1, max);
        self.read_buffer.clear();

        while self.read_buffer.len() < min {
            let want = max - self.read_buffer.len();
            if self.read_timed(want).await? == 0 {
                return Ok(Received {
                    data: self.read_buffer.split().freeze(),
                    is_complete: true,
                });
            }
        }

        Ok(Received {
            data: self.read_buffer.split().freeze(),
            is_complete: false,
        })
    }

    /// Reads whatever the peer has sent next, up to [`DEFAULT_CHUNK_SIZE`].
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or exceeds the I/O timeout.
    pub async fn receive_some(&mut self) -> Result<Received> {
        self.receive(1, DEFAULT_CHUNK_SIZE).await
    }

    /// Shuts down the write side of the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown fails or exceeds the I/O timeout.
    pub async fn close(&mut self) -> Result<()> {
        let limit = self.io_timeout;
        timeout(limit, self.stream.shutdown())
            .await
            .map_err(|_| Error::Timeout(limit))??;
        Ok(())
    }

    /// Appends at most `want` bytes to the read buffer.
    async fn read_timed(&mut self, want: usize) -> Result<usize> {
        let limit = self.io_timeout;
        self.read_buffer.reserve(want.min(READ_BUFFER_SIZE));
        let mut buf = (&mut self.read_buffer).limit(want);
        let n = timeout(limit, self.stream.read_buf(&mut buf))
            .await
            .map_err(|_| Error::Timeout(limit))??;
        Ok(n)
    }
}

impl<S> Transport<S> {
    /// Returns the I/O timeout.
    #[must_use]
    pub const fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    /// Gets a reference to the underlying stream.
    pub const fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Consumes the transport and returns the stream and its I/O timeout.
    pub fn into_parts(self) -> (S, Duration) {
        (self.stream, self.io_timeout)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_writes_everything() {
        let mock = tokio_test::io::Builder::new()
            .write(b"NOOP\r\n")
            .build();
        let mut transport = Transport::new(mock);
        transport.send(b"NOOP\r\n").await.unwrap();
    }

    #[tokio::test]
    async fn test_receive_collects_min_bytes() {
        let mock = tokio_test::io::Builder::new()
            .read(b"+O")
            .read(b"K\r\n")
            .build();
        let mut transport = Transport::new(mock);

        let received = transport.receive(5, 1024).await.unwrap();
        assert_eq!(&received.data[..], b"+OK\r\n");
        assert!(!received.is_complete);
    }

    #[tokio::test]
    async fn test_receive_respects_max() {
        let mock = tokio_test::io::Builder::new().read(b"abcdef").build();
        let mut transport = Transport::new(mock);

        let first = transport.receive(1, 4).await.unwrap();
        assert_eq!(&first.data[..], b"abcd");
        let second = transport.receive(1, 4).await.unwrap();
        assert_eq!(&second.data[..], b"ef");
        assert_eq!(&first.data[..], b"abcd");
    }

    #[tokio::test]
    async fn test_receive_reports_eof() {
        let mock = tokio_test::io::Builder::new().read(b"bye").build();
        let mut transport = Transport::new(mock);

        let received = transport.receive(10, 1024).await.unwrap();
        assert_eq!(&received.data[..], b"bye");
        assert!(received.is_complete);
    }

    #[tokio::test]
    async fn test_receive_propagates_io_error() {
        let mock = tokio_test::io::Builder::new()
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();
        let mut transport = Transport::new(mock);

        let err = transport.receive_some().await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_times_out() {
        let (client, _server) = tokio::io::duplex(64);
        let mut transport = Transport::with_io_timeout(client, Duration::from_secs(2));

        let err = transport.receive_some().await.unwrap_err();
        assert!(err.is_timeout());
    }
}
