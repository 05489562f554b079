//! Error types for message parsing and composition.

use std::string::FromUtf8Error;

/// Result type alias for message operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Message error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input is not a message at all.
    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    /// A message must have at least one `To` recipient.
    #[error("Message has no recipient")]
    MissingRecipient,

    /// Address is not of the form `local@domain`.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid encoded word.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// UTF-8 decode error.
    #[error("UTF-8 decode error: {0}")]
    Utf8Decode(#[from] FromUtf8Error),
}
