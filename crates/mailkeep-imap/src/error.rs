//! Error types for the IMAP client.

use thiserror::Error;

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection-level failure (connect, TLS, read/write, timeout).
    #[error(transparent)]
    Transport(#[from] mailkeep_transport::Error),

    /// Server closed the connection mid-response.
    #[error("connection closed by server")]
    ConnectionClosed,

    /// No connection is open.
    #[error("not connected")]
    NotConnected,

    /// Invalid state for the requested operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid argument supplied by the caller.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Credentials were rejected.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Server sent something that does not match the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Server returned NO response.
    #[error("Server returned NO: {0}")]
    No(String),

    /// Server returned BAD response.
    #[error("Server returned BAD: {0}")]
    Bad(String),

    /// Response exceeded a framing limit.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Returns true if the operation ran out of time.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }

    /// Returns true if the server rejected the credentials.
    #[must_use]
    pub const fn is_authentication(&self) -> bool {
        matches!(self, Self::AuthenticationFailed)
    }

    /// Returns true if the connection itself failed or is gone.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::NotConnected)
            || matches!(self, Self::Transport(e) if e.is_connection())
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
