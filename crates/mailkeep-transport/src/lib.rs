//! # mailkeep-transport
//!
//! The byte-stream layer underneath the mailkeep IMAP, POP3 and SMTP clients.
//!
//! - [`MailStream`]: a TCP socket, optionally wrapped in TLS (rustls with the
//!   webpki root store)
//! - [`Transport`]: timed `send` / `receive(min, max)` / `close` over any
//!   `AsyncRead + AsyncWrite` stream
//! - [`Connector`]: how protocol clients obtain a [`Transport`], including the
//!   STARTTLS upgrade
//!
//! No operation is retried here; callers decide.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailkeep_transport::{Connector, ServerConfig, TcpConnector};
//!
//! let config = ServerConfig::incoming("imap.example.com", 993, true);
//! let mut transport = TcpConnector.connect(&config).await?;
//! let greeting = transport.receive_some().await?;
//! transport.close().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod connector;
pub mod error;
pub mod stream;
pub mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod scripted;

pub use config::{Security, ServerConfig, ServerConfigBuilder};
pub use connector::{Connector, TcpConnector};
pub use error::{Error, Result};
pub use stream::MailStream;
pub use transport::{Received, Transport};

#[cfg(any(test, feature = "test-util"))]
pub use scripted::ScriptedConnector;
