//! Account model types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use mailkeep_transport::ServerConfig;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Default implicit-TLS IMAP port.
pub const DEFAULT_IMAP_PORT: u16 = 993;

/// Default implicit-TLS POP3 port.
pub const DEFAULT_POP3_PORT: u16 = 995;

/// Default SMTP submission port (STARTTLS).
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Unique, immutable identifier for an account.
///
/// Also the key under which the account's password is kept in the
/// credential store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Protocol used to download mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    /// IMAP: server-side folders.
    Imap,
    /// POP3: a single mailbox, no folders.
    Pop3,
}

impl ServerType {
    /// Storage name for the server type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Imap => "imap",
            Self::Pop3 => "pop3",
        }
    }

    /// Default incoming port for the protocol.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Imap => DEFAULT_IMAP_PORT,
            Self::Pop3 => DEFAULT_POP3_PORT,
        }
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "imap" => Ok(Self::Imap),
            "pop3" | "pop" => Ok(Self::Pop3),
            other => Err(Error::Config(format!("unknown server type: {other}"))),
        }
    }
}

/// A mail account.
///
/// The password is never part of the account; it lives in the credential
/// store under [`Account::id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Stable identifier.
    pub id: AccountId,
    /// Address used as login name and sender.
    pub email: String,
    /// Incoming protocol.
    pub server_type: ServerType,
    /// Incoming server host. POP3 accounts keep their server here too.
    pub imap_host: Option<String>,
    /// Incoming server port.
    pub imap_port: u16,
    /// SMTP submission host.
    pub smtp_host: String,
    /// SMTP submission port.
    pub smtp_port: u16,
    /// Whether connections use TLS (implicit for incoming, STARTTLS or
    /// implicit for SMTP depending on the port).
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
    /// When the account was added.
    pub created_at: DateTime<Utc>,
}

const fn default_use_tls() -> bool {
    true
}

/// Incoming server for an account, one variant per protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingServer {
    /// Sync through IMAP.
    Imap(ServerConfig),
    /// Sync through POP3.
    Pop3(ServerConfig),
}

impl IncomingServer {
    /// Returns the server configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        match self {
            Self::Imap(config) | Self::Pop3(config) => config,
        }
    }
}

impl Account {
    /// Creates an account with a fresh id and default ports.
    #[must_use]
    pub fn new(
        email: impl Into<String>,
        server_type: ServerType,
        incoming_host: impl Into<String>,
        smtp_host: impl Into<String>,
    ) -> Self {
        Self {
            id: AccountId::generate(),
            email: email.into(),
            server_type,
            imap_host: Some(incoming_host.into()),
            imap_port: server_type.default_port(),
            smtp_host: smtp_host.into(),
            smtp_port: DEFAULT_SMTP_PORT,
            use_tls: true,
            created_at: Utc::now(),
        }
    }

    /// Sets the incoming server port.
    #[must_use]
    pub const fn with_incoming_port(mut self, port: u16) -> Self {
        self.imap_port = port;
        self
    }

    /// Sets the SMTP port.
    #[must_use]
    pub const fn with_smtp_port(mut self, port: u16) -> Self {
        self.smtp_port = port;
        self
    }

    /// Enables or disables TLS.
    #[must_use]
    pub const fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Selects the incoming server for this account's protocol.
    ///
    /// # Errors
    ///
    /// Returns `Config` if no incoming host is set.
    pub fn incoming(&self) -> Result<IncomingServer> {
        let host = self
            .imap_host
            .as_deref()
            .filter(|host| !host.trim().is_empty())
            .ok_or_else(|| Error::Config(format!("account {} has no incoming host", self.email)))?;

        let config = ServerConfig::incoming(host, self.imap_port, self.use_tls);
        Ok(match self.server_type {
            ServerType::Imap => IncomingServer::Imap(config),
            ServerType::Pop3 => IncomingServer::Pop3(config),
        })
    }

    /// Returns the SMTP submission server.
    #[must_use]
    pub fn outgoing(&self) -> ServerConfig {
        ServerConfig::submission(&self.smtp_host, self.smtp_port, self.use_tls)
    }

    /// Domain announced in EHLO: the part of the email after `@`.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.email
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .filter(|domain| !domain.is_empty())
            .unwrap_or("localhost")
    }
}
