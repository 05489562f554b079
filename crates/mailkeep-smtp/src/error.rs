//! Error types for SMTP operations.

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection-level failure (connect, TLS, read/write, timeout).
    #[error(transparent)]
    Transport(#[from] mailkeep_transport::Error),

    /// Server closed the connection mid-reply.
    #[error("connection closed by server")]
    ConnectionClosed,

    /// No connection is open.
    #[error("not connected")]
    NotConnected,

    /// Invalid state for operation.
    #[error("Invalid state for operation: {0}")]
    InvalidState(String),

    /// Credentials were rejected.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Server reply did not carry the expected code.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A recipient was refused at RCPT TO.
    #[error("recipient rejected: {0}")]
    RecipientRejected(String),

    /// The transaction was refused at MAIL FROM, DATA or end of data.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// `send_mail` called without recipients.
    #[error("no recipients")]
    NoRecipients,

    /// Server returned an error reply to a session command.
    #[error("SMTP error {code}: {message}")]
    SmtpError {
        /// Reply code (e.g., 550).
        code: u16,
        /// Error message from server.
        message: String,
    },

    /// Protocol error (unparseable reply).
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Creates an SMTP error from a reply code and message.
    #[must_use]
    pub fn smtp_error(code: u16, message: impl Into<String>) -> Self {
        Self::SmtpError {
            code,
            message: message.into(),
        }
    }

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
