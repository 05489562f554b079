//! POP3 client state machine.

use std::fmt;

use bytes::BytesMut;
use mailkeep_transport::{Connector, ServerConfig, TcpConnector, Transport};
use tracing::{debug, info, warn};

use crate::response::{
    MailboxStat, MessageInfo, Reply, ResponseLimits, UidlEntry, is_complete, parse_list,
    parse_stat, parse_uidl,
};
use crate::{Error, Result};

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// No usable connection.
    #[default]
    Disconnected,
    /// Greeting received (AUTHORIZATION state).
    Connected,
    /// USER/PASS accepted (TRANSACTION state).
    Authenticated,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Authenticated => "authenticated",
        })
    }
}

/// POP3 client owning a single connection.
///
/// Commands are strictly sequential (`&mut self`). While a command is in
/// flight the client reports [`State::Disconnected`], so a dropped future
/// never leaves a half-authenticated session behind.
pub struct Pop3Client<C: Connector = TcpConnector> {
    config: ServerConfig,
    connector: C,
    transport: Option<Transport<C::Stream>>,
    buffer: BytesMut,
    limits: ResponseLimits,
    state: State,
}

impl Pop3Client<TcpConnector> {
    /// Creates a client that connects over TCP.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self::with_connector(config, TcpConnector)
    }
}

impl<C: Connector> Pop3Client<C> {
    /// Creates a client that obtains its connection from `connector`.
    #[must_use]
    pub fn with_connector(config: ServerConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            transport: None,
            buffer: BytesMut::new(),
            limits: ResponseLimits::default(),
            state: State::Disconnected,
        }
    }

    /// Replaces the reply size and read-count limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: ResponseLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    /// Opens the connection and reads the `+OK` greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if already connected, the connection cannot be
    /// opened, or the greeting is not `+OK`.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state != State::Disconnected {
            return Err(Error::InvalidState(format!(
                "connect called while {}",
                self.state
            )));
        }

        self.transport = None;
        self.buffer.clear();
        self.transport = Some(self.connector.connect(&self.config).await?);

        let greeting = match self.read_reply(false).await {
            Ok(greeting) => greeting,
            Err(e) => {
                self.close().await;
                return Err(e);
            }
        };
        if !greeting.ok {
            self.transport = None;
            return Err(Error::InvalidResponse(format!("-ERR {}", greeting.text)));
        }

        self.state = State::Connected;
        info!(host = %self.config.host, "POP3 connected");
        Ok(())
    }

    /// Authenticates with USER and PASS.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationFailed` if either step is not answered `+OK`.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let previous = self.begin("USER", &[State::Connected])?;

        match self.authenticate(username, password).await {
            Ok(()) => {
                self.state = State::Authenticated;
                info!(username, "POP3 authenticated");
                Ok(())
            }
            Err(e) => {
                if self.transport.is_some() {
                    self.state = previous;
                }
                Err(e)
            }
        }
    }

    async fn authenticate(&mut self, username: &str, password: &str) -> Result<()> {
        let user = self
            .exchange(&format!("USER {username}"), None, false)
            .await?;
        if !user.ok {
            debug!("POP3 USER rejected: {}", user.text);
            return Err(Error::AuthenticationFailed);
        }

        let pass = self
            .exchange(&format!("PASS {password}"), Some("PASS [redacted]"), false)
            .await?;
        if !pass.ok {
            debug!("POP3 PASS rejected: {}", pass.text);
            return Err(Error::AuthenticationFailed);
        }
        Ok(())
    }

    /// Returns the message count and total size.
    ///
    /// # Errors
    ///
    /// Returns an error if not authenticated, the server answers `-ERR`, or
    /// the reply has fewer than two numbers.
    pub async fn stat(&mut self) -> Result<MailboxStat> {
        let reply = self.command("STAT", false).await?;
        parse_stat(&reply.text)
    }

    /// Lists message numbers and sizes.
    ///
    /// # Errors
    ///
    /// Returns an error if not authenticated or the server answers `-ERR`.
    pub async fn list(&mut self) -> Result<Vec<MessageInfo>> {
        let reply = self.command("LIST", true).await?;
        Ok(parse_list(&reply.lines))
    }

    /// Lists message numbers and their unique ids.
    ///
    /// # Errors
    ///
    /// Returns an error if not authenticated or the server answers `-ERR`
    /// (UIDL is optional in RFC 1939).
    pub async fn uidl(&mut self) -> Result<Vec<UidlEntry>> {
        let reply = self.command("UIDL", true).await?;
        Ok(parse_uidl(&reply.lines))
    }

    /// Downloads message `number` in full.
    ///
    /// Returns the message text with CRLF line endings, without the
    /// terminating `.` line.
    ///
    /// # Errors
    ///
    /// Returns `MessageNotFound` if the server answers `-ERR`.
    pub async fn retrieve(&mut self, number: u32) -> Result<String> {
        match self.command(&format!("RETR {number}"), true).await {
            Ok(reply) => Ok(reply.body()),
            Err(Error::Rejected(text)) => {
                debug!("POP3 RETR {number} rejected: {text}");
                Err(Error::MessageNotFound(number))
            }
            Err(e) => Err(e),
        }
    }

    /// Marks message `number` for deletion at QUIT.
    ///
    /// # Errors
    ///
    /// Returns an error if not authenticated or the server answers `-ERR`.
    pub async fn dele(&mut self, number: u32) -> Result<()> {
        self.command(&format!("DELE {number}"), false).await?;
        Ok(())
    }

    /// Unmarks all messages marked for deletion.
    ///
    /// # Errors
    ///
    /// Returns an error if not authenticated or the server answers `-ERR`.
    pub async fn rset(&mut self) -> Result<()> {
        self.command("RSET", false).await?;
        Ok(())
    }

    /// Does nothing, keeping the session alive.
    ///
    /// # Errors
    ///
    /// Returns an error if not authenticated or the server answers `-ERR`.
    pub async fn noop(&mut self) -> Result<()> {
        self.command("NOOP", false).await?;
        Ok(())
    }

    /// Ends the session with QUIT, committing deletions, and closes the
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns an error if not connected or QUIT is not acknowledged. The
    /// connection is closed either way.
    pub async fn quit(&mut self) -> Result<()> {
        let outcome = match self.begin("QUIT", &[State::Connected, State::Authenticated]) {
            Ok(_) => self.exchange("QUIT", None, false).await.and_then(|reply| {
                if reply.ok {
                    Ok(())
                } else {
                    Err(Error::Rejected(reply.text))
                }
            }),
            Err(e) => Err(e),
        };
        self.close().await;
        outcome
    }

    /// Ends the session.
    ///
    /// Sends QUIT if the session is usable, ignoring its outcome, then
    /// always closes the connection.
    pub async fn disconnect(&mut self) {
        if matches!(self.state, State::Connected | State::Authenticated) {
            if let Err(e) = self.quit().await {
                debug!("POP3 QUIT failed: {e}");
            }
        }
        self.close().await;
    }

    async fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                debug!("POP3 close failed: {e}");
            }
            info!(host = %self.config.host, "POP3 disconnected");
        }
        self.buffer.clear();
        self.state = State::Disconnected;
    }

    /// Runs a TRANSACTION-state command, mapping `-ERR` to `Rejected`.
    async fn command(&mut self, line: &str, multiline: bool) -> Result<Reply> {
        let previous = self.begin(line, &[State::Authenticated])?;
        let outcome = self.exchange(line, None, multiline).await;
        if self.transport.is_some() {
            self.state = previous;
        }

        let reply = outcome?;
        if reply.ok {
            Ok(reply)
        } else {
            Err(Error::Rejected(reply.text))
        }
    }

    /// Checks the state and marks the client as busy.
    fn begin(&mut self, command: &str, allowed: &[State]) -> Result<State> {
        if self.transport.is_none() {
            return Err(Error::NotConnected);
        }
        if !allowed.contains(&self.state) {
            let verb = command.split(' ').next().unwrap_or(command);
            return Err(Error::InvalidState(format!(
                "{verb} not allowed while {}",
                self.state
            )));
        }
        Ok(std::mem::take(&mut self.state))
    }

    /// Sends one command line and reads its reply.
    ///
    /// Any failure leaves the position in the reply stream unknown, so the
    /// connection is closed and the client ends up Disconnected.
    async fn exchange(&mut self, line: &str, shown: Option<&str>, multiline: bool) -> Result<Reply> {
        debug!("POP3 -> {}", shown.unwrap_or(line));
        let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;
        let outcome = match transport.send(format!("{line}\r\n").as_bytes()).await {
            Ok(()) => self.read_reply(multiline).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = &outcome {
            warn!("POP3 session dropped after failed {}: {e}", line.split(' ').next().unwrap_or(line));
            self.close().await;
        }
        outcome
    }

    /// Reassembles one reply, bounded by the response limits.
    async fn read_reply(&mut self, multiline: bool) -> Result<Reply> {
        let mut reads = 0;

        while !is_complete(&self.buffer, multiline) {
            if reads >= self.limits.max_reads {
                return Err(Error::Protocol(format!(
                    "reply incomplete after {reads} reads"
                )));
            }

            let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;
            let received = transport.receive_some().await?;
            reads += 1;

            if received.data.is_empty() {
                return Err(if self.buffer.is_empty() {
                    Error::InvalidResponse("empty response".to_string())
                } else {
                    Error::ConnectionClosed
                });
            }

            self.buffer.extend_from_slice(&received.data);
            if self.buffer.len() > self.limits.max_bytes {
                let size = self.buffer.len();
                self.buffer.clear();
                return Err(Error::Protocol(format!(
                    "reply exceeds {} bytes ({size} received)",
                    self.limits.max_bytes
                )));
            }
        }

        let raw = self.buffer.split().freeze();
        let reply = Reply::parse(&raw, multiline)?;
        debug!(
            "POP3 <- {} {} ({} lines)",
            if reply.ok { "+OK" } else { "-ERR" },
            reply.text,
            reply.lines.len()
        );
        Ok(reply)
    }
}

impl<C: Connector> fmt::Debug for Pop3Client<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pop3Client")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
