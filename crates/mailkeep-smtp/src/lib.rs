//! # mailkeep-smtp
//!
//! SMTP submission client: greeting, EHLO, STARTTLS, AUTH LOGIN and the
//! MAIL FROM / RCPT TO / DATA transaction.
//!
//! ## Features
//!
//! - **Implicit TLS or STARTTLS**: port 465 speaks TLS from the first byte;
//!   other ports upgrade after the first EHLO when TLS is requested
//! - **Multi-line replies**: a reply is complete at the first line whose code
//!   is followed by a space, however the bytes were split on the wire
//! - **Safe DATA**: line endings are normalized to CRLF and leading dots are
//!   stuffed before the terminating `.` line
//! - **Credential redaction**: the AUTH password is logged as `[redacted]`
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailkeep_smtp::SmtpClient;
//! use mailkeep_transport::ServerConfig;
//!
//! let mut client = SmtpClient::new(ServerConfig::submission("smtp.example.com", 587, true));
//! client.connect().await?;
//! client.handshake("client.example.com").await?;
//! client.login("alice@example.com", "password").await?;
//!
//! client
//!     .send_mail("alice@example.com", &["bob@example.com"], &rfc5322_text)
//!     .await?;
//! client.disconnect().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod client;
pub mod command;
pub mod error;
pub mod reply;

pub use client::{SmtpClient, State};
pub use command::{Command, encode_data};
pub use error::{Error, Result};
pub use reply::{Reply, ReplyCode};
