//! SMTP command builder.

use std::fmt;

/// SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// EHLO - Extended greeting
    Ehlo {
        /// Client domain
        domain: String,
    },
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// AUTH LOGIN - Begin the LOGIN exchange
    AuthLogin,
    /// Base64 line answering a 334 challenge
    AuthResponse {
        /// Encoded payload
        payload: String,
        /// Whether the payload must be kept out of logs
        secret: bool,
    },
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Sender address
        from: String,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Recipient address
        to: String,
    },
    /// DATA - Begin message data
    Data,
    /// RSET - Reset transaction
    Rset,
    /// NOOP - No operation
    Noop,
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// Serializes the command to bytes.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = match self {
            Self::Ehlo { domain } => format!("EHLO {domain}").into_bytes(),
            Self::StartTls => b"STARTTLS".to_vec(),
            Self::AuthLogin => b"AUTH LOGIN".to_vec(),
            Self::AuthResponse { payload, .. } => payload.clone().into_bytes(),
            Self::MailFrom { from } => format!("MAIL FROM:<{from}>").into_bytes(),
            Self::RcptTo { to } => format!("RCPT TO:<{to}>").into_bytes(),
            Self::Data => b"DATA".to_vec(),
            Self::Rset => b"RSET".to_vec(),
            Self::Noop => b"NOOP".to_vec(),
            Self::Quit => b"QUIT".to_vec(),
        };
        buf.extend_from_slice(b"\r\n");
        buf
    }
}

/// Log-safe rendering: secret AUTH payloads print as `[redacted]`.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthResponse { secret: true, .. } => f.write_str("[redacted]"),
            other => {
                let bytes = other.serialize();
                f.write_str(String::from_utf8_lossy(&bytes).trim_end())
            }
        }
    }
}

/// Prepares message text for the DATA phase.
///
/// Line endings are normalized to CRLF, lines starting with `.` are
/// byte-stuffed, and the terminating `.` line is appended.
#[must_use]
pub fn encode_data(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + message.len() / 32 + 5);
    let body = message.strip_suffix(b"\n").unwrap_or(message);
    let body = body.strip_suffix(b"\r").unwrap_or(body);

    if !body.is_empty() {
        for line in body.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.first() == Some(&b'.') {
                out.push(b'.');
            }
            out.extend_from_slice(line);
            out.extend_from_slice(b"\r\n");
        }
    }

    out.extend_from_slice(b".\r\n");
    out
}
