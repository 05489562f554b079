//! Error types for the POP3 client.

use thiserror::Error;

/// Errors that can occur during POP3 operations.
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

    /// Credentials were rejected.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Server sent something that does not match the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Server answered `-ERR`.
    #[error("server returned -ERR: {0}")]
    Rejected(String),

    /// RETR for a message number the server does not have.
    #[error("message {0} not found")]
    MessageNotFound(u32),

    /// Response exceeded the size or read-count limit.
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
