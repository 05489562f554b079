//! Server endpoint configuration.

use std::time::Duration;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default read/write timeout.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(60);

/// Port on which SMTP submission uses TLS from the first byte.
pub const SMTPS_PORT: u16 = 465;

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// No encryption. **Not recommended for production.**
    None,
    /// Start with plaintext, upgrade with STARTTLS.
    StartTls,
    /// TLS from the start. **Recommended.**
    #[default]
    Implicit,
}

impl Security {
    /// Returns true if the first byte on the wire is already TLS.
    #[must_use]
    pub const fn is_implicit(self) -> bool {
        matches!(self, Self::Implicit)
    }
}

/// Where and how to reach a mail server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Read/write timeout.
    pub io_timeout: Duration,
}

impl ServerConfig {
    /// Configuration for an incoming (IMAP or POP3) server.
    ///
    /// Incoming servers either speak TLS from the first byte or not at all.
    #[must_use]
    pub fn incoming(host: impl Into<String>, port: u16, use_tls: bool) -> Self {
        let security = if use_tls {
            Security::Implicit
        } else {
            Security::None
        };
        Self::builder(host).port(port).security(security).build()
    }

    /// Configuration for an SMTP submission server.
    ///
    /// Port 465 means implicit TLS; any other port starts in plaintext and
    /// is upgraded with STARTTLS when `use_tls` is set.
    #[must_use]
    pub fn submission(host: impl Into<String>, port: u16, use_tls: bool) -> Self {
        let security = match (use_tls, port) {
            (true, SMTPS_PORT) => Security::Implicit,
            (true, _) => Security::StartTls,
            (false, _) => Security::None,
        };
        Self::builder(host).port(port).security(security).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ServerConfigBuilder {
        ServerConfigBuilder::new(host)
    }

    /// Returns `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    host: String,
    port: u16,
    security: Security,
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl ServerConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 993,
            security: Security::Implicit,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the I/O timeout.
    #[must_use]
    pub const fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            security: self.security,
            connect_timeout: self.connect_timeout,
            io_timeout: self.io_timeout,
        }
    }
}
