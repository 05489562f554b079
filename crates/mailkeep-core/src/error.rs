//! Error types for the core library.

use std::fmt;

use thiserror::Error;

use crate::account::CredentialError;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IMAP operation failed.
    #[error("IMAP error: {0}")]
    Imap(#[from] mailkeep_imap::Error),

    /// POP3 operation failed.
    #[error("POP3 error: {0}")]
    Pop3(#[from] mailkeep_pop3::Error),

    /// SMTP operation failed.
    #[error("SMTP error: {0}")]
    Smtp(#[from] mailkeep_smtp::Error),

    /// Message parsing or composition failed.
    #[error("Message error: {0}")]
    Mime(#[from] mailkeep_mime::Error),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Credential storage error.
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Every connection attempt allowed by the retry policy failed.
    #[error("server not responding")]
    ServerNotResponding,

    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Broad failure categories shared by every layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The connection could not be opened or was lost.
    ConnectionFailed,
    /// The server rejected the credentials, or none are stored.
    AuthenticationFailed,
    /// The server answered with something unexpected.
    InvalidResponse,
    /// An operation ran out of time.
    Timeout,
    /// A POP3 message number does not exist.
    MessageNotFound,
    /// An SMTP recipient was refused.
    RecipientRejected,
    /// A message was composed without recipients.
    MissingRecipient,
    /// An address is not `local@domain`.
    InvalidAddress,
    /// A message could not be parsed.
    ParseError,
    /// The local cache failed.
    DatabaseError,
    /// Retries were exhausted.
    ServerNotResponding,
    /// The credential store failed.
    Credential,
    /// Missing account or bad configuration.
    Configuration,
    /// Local filesystem failure.
    Io,
}

impl Error {
    /// Maps the error onto its [`ErrorKind`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Imap(e) => protocol_kind(e.is_timeout(), e.is_authentication(), e.is_connection()),
            Self::Pop3(mailkeep_pop3::Error::MessageNotFound(_)) => ErrorKind::MessageNotFound,
            Self::Pop3(e) => protocol_kind(e.is_timeout(), e.is_authentication(), e.is_connection()),
            Self::Smtp(mailkeep_smtp::Error::RecipientRejected(_)) => ErrorKind::RecipientRejected,
            Self::Smtp(mailkeep_smtp::Error::NoRecipients) => ErrorKind::MissingRecipient,
            Self::Smtp(e) => protocol_kind(e.is_timeout(), e.is_authentication(), e.is_connection()),
            Self::Mime(mailkeep_mime::Error::MissingRecipient) => ErrorKind::MissingRecipient,
            Self::Mime(mailkeep_mime::Error::InvalidAddress(_)) => ErrorKind::InvalidAddress,
            Self::Mime(_) => ErrorKind::ParseError,
            Self::Database(_) | Self::Serialization(_) => ErrorKind::DatabaseError,
            Self::Io(_) => ErrorKind::Io,
            Self::Credential(CredentialError::NotFound(_)) => ErrorKind::AuthenticationFailed,
            Self::Credential(_) => ErrorKind::Credential,
            Self::ServerNotResponding => ErrorKind::ServerNotResponding,
            Self::AccountNotFound(_) | Self::Config(_) => ErrorKind::Configuration,
        }
    }

    /// Returns true if the server could not be reached or stopped answering.
    ///
    /// Messages that fail to send for these reasons are kept for a later
    /// attempt.
    #[must_use]
    pub const fn is_connection_class(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ConnectionFailed | ErrorKind::Timeout | ErrorKind::ServerNotResponding
        )
    }
}

const fn protocol_kind(timeout: bool, authentication: bool, connection: bool) -> ErrorKind {
    if timeout {
        ErrorKind::Timeout
    } else if authentication {
        ErrorKind::AuthenticationFailed
    } else if connection {
        ErrorKind::ConnectionFailed
    } else {
        ErrorKind::InvalidResponse
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::ConnectionFailed => "connection failed",
            Self::AuthenticationFailed => "authentication failed",
            Self::InvalidResponse => "invalid response",
            Self::Timeout => "timed out",
            Self::MessageNotFound => "message not found",
            Self::RecipientRejected => "recipient rejected",
            Self::MissingRecipient => "missing recipient",
            Self::InvalidAddress => "invalid address",
            Self::ParseError => "parse error",
            Self::DatabaseError => "database error",
            Self::ServerNotResponding => "server not responding",
            Self::Credential => "credential store error",
            Self::Configuration => "configuration error",
            Self::Io => "I/O error",
        };
        f.write_str(text)
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
