//! SMTP client state machine.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::BytesMut;
use mailkeep_transport::{Connector, Security, ServerConfig, TcpConnector, Transport};
use tracing::{debug, info, warn};

use crate::command::{Command, encode_data};
use crate::reply::{Reply, ReplyCode, parse_reply, reply_end};
use crate::{Error, Result};

/// Upper bound on a single reply.
const MAX_REPLY_BYTES: usize = 64 * 1024;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// No usable connection.
    #[default]
    Disconnected,
    /// Greeting received.
    Connected,
    /// AUTH accepted.
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

/// Progress of the current mail transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transaction {
    Idle,
    Mail,
    Recipients(usize),
}

/// SMTP submission client owning a single connection.
///
/// A send runs as one transaction: `mail_from`, one or more `rcpt_to`, then
/// `data`. [`SmtpClient::send_mail`] drives all three.
pub struct SmtpClient<C: Connector = TcpConnector> {
    config: ServerConfig,
    connector: C,
    transport: Option<Transport<C::Stream>>,
    buffer: BytesMut,
    state: State,
    transaction: Transaction,
    tls: bool,
    capabilities: Vec<String>,
}

impl SmtpClient<TcpConnector> {
    /// Creates a client that connects over TCP.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self::with_connector(config, TcpConnector)
    }
}

impl<C: Connector> SmtpClient<C> {
    /// Creates a client that obtains its connection from `connector`.
    #[must_use]
    pub fn with_connector(config: ServerConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            transport: None,
            buffer: BytesMut::new(),
            state: State::Disconnected,
            transaction: Transaction::Idle,
            tls: false,
            capabilities: Vec::new(),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    /// Returns true once the connection is encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        self.tls
    }

    /// Returns true if the last EHLO advertised `keyword`.
    #[must_use]
    pub fn supports(&self, keyword: &str) -> bool {
        self.capabilities.iter().any(|cap| {
            cap.split_whitespace()
                .next()
                .is_some_and(|k| k.eq_ignore_ascii_case(keyword))
        })
    }

    /// Opens the connection and reads the 220 greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if already connected, the connection cannot be
    /// opened, or the greeting code is not 220.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state != State::Disconnected {
            return Err(Error::InvalidState(format!(
                "connect called while {}",
                self.state
            )));
        }

        self.reset_session();
        self.transport = Some(self.connector.connect(&self.config).await?);
        self.tls = self.config.security.is_implicit();

        let greeting = self.read_reply().await?;
        if !greeting.is(ReplyCode::SERVICE_READY) {
            self.transport = None;
            return Err(Error::InvalidResponse(greeting.lines.join(" ")));
        }

        self.state = State::Connected;
        info!(host = %self.config.host, tls = self.tls, "SMTP connected");
        Ok(())
    }

    /// Sends EHLO and returns the raw reply lines.
    ///
    /// # Errors
    ///
    /// Returns `InvalidResponse` if the reply code is not 250.
    pub async fn ehlo(&mut self, domain: &str) -> Result<Vec<String>> {
        let reply = self
            .session_command(
                &Command::Ehlo {
                    domain: domain.to_string(),
                },
                &[State::Connected, State::Authenticated],
            )
            .await?;

        if !reply.is(ReplyCode::OK) {
            return Err(Error::InvalidResponse(reply.lines.join(" ")));
        }

        self.capabilities = reply
            .lines
            .iter()
            .skip(1)
            .filter_map(|line| line.get(4..))
            .map(str::to_string)
            .collect();
        Ok(reply.lines)
    }

    /// Upgrades the connection with STARTTLS.
    ///
    /// The server forgets everything learned before the upgrade, so EHLO must
    /// be sent again afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if TLS is already active, the server refuses, or the
    /// handshake fails. A failed handshake leaves the client disconnected.
    pub async fn starttls(&mut self) -> Result<()> {
        if self.tls {
            return Err(Error::InvalidState("TLS already active".to_string()));
        }

        let reply = self
            .session_command(&Command::StartTls, &[State::Connected])
            .await?;
        if !reply.is(ReplyCode::SERVICE_READY) {
            return Err(Error::smtp_error(reply.code.0, reply.message_text()));
        }

        let transport = self.transport.take().ok_or(Error::NotConnected)?;
        self.state = State::Disconnected;
        let upgraded = self.connector.upgrade(transport, &self.config.host).await?;

        self.transport = Some(upgraded);
        self.buffer.clear();
        self.capabilities.clear();
        self.tls = true;
        self.state = State::Connected;
        Ok(())
    }

    /// Greets the server, upgrading with STARTTLS when the configuration
    /// asks for it.
    ///
    /// Returns the EHLO lines of the final greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if EHLO or the upgrade fails.
    pub async fn handshake(&mut self, domain: &str) -> Result<Vec<String>> {
        let lines = self.ehlo(domain).await?;
        if self.config.security == Security::StartTls && !self.tls {
            self.starttls().await?;
            return self.ehlo(domain).await;
        }
        Ok(lines)
    }

    /// Authenticates with AUTH LOGIN.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationFailed` if any step is answered with an
    /// unexpected code.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let previous = self.begin(&Command::AuthLogin, &[State::Connected])?;

        match self.authenticate(username, password).await {
            Ok(()) => {
                self.state = State::Authenticated;
                info!(username, "SMTP authenticated");
                Ok(())
            }
            Err(e) => {
                self.state = previous;
                Err(e)
            }
        }
    }

    async fn authenticate(&mut self, username: &str, password: &str) -> Result<()> {
        let steps = [
            (Command::AuthLogin, ReplyCode::AUTH_CONTINUE),
            (
                Command::AuthResponse {
                    payload: BASE64.encode(username),
                    secret: false,
                },
                ReplyCode::AUTH_CONTINUE,
            ),
            (
                Command::AuthResponse {
                    payload: BASE64.encode(password),
                    secret: true,
                },
                ReplyCode::AUTH_SUCCESS,
            ),
        ];

        for (command, expected) in &steps {
            let reply = self.exchange(command).await?;
            if !reply.is(*expected) {
                debug!("SMTP AUTH step rejected: {} {}", reply.code, reply.message_text());
                return Err(Error::AuthenticationFailed);
            }
        }
        Ok(())
    }

    /// Starts a mail transaction.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if a transaction is already open and
    /// `SendFailed` if the server does not answer 250.
    pub async fn mail_from(&mut self, from: &str) -> Result<()> {
        if self.transaction != Transaction::Idle {
            return Err(Error::InvalidState(
                "MAIL FROM inside an open transaction".to_string(),
            ));
        }

        let reply = self
            .session_command(
                &Command::MailFrom {
                    from: from.to_string(),
                },
                &[State::Connected, State::Authenticated],
            )
            .await?;
        if !reply.is(ReplyCode::OK) {
            return Err(Error::SendFailed(format!(
                "MAIL FROM rejected: {} {}",
                reply.code,
                reply.message_text()
            )));
        }

        self.transaction = Transaction::Mail;
        Ok(())
    }

    /// Adds a recipient to the open transaction.
    ///
    /// A rejection leaves the transaction and its accepted recipients
    /// intact.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` without an open transaction and
    /// `RecipientRejected` if the server refuses the address.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<()> {
        let accepted = match self.transaction {
            Transaction::Idle => {
                return Err(Error::InvalidState("RCPT TO before MAIL FROM".to_string()));
            }
            Transaction::Mail => 0,
            Transaction::Recipients(n) => n,
        };

        let reply = self
            .session_command(
                &Command::RcptTo { to: to.to_string() },
                &[State::Connected, State::Authenticated],
            )
            .await?;
        if !(reply.is(ReplyCode::OK) || reply.is(ReplyCode::USER_NOT_LOCAL)) {
            debug!("SMTP RCPT {to} rejected: {} {}", reply.code, reply.message_text());
            return Err(Error::RecipientRejected(to.to_string()));
        }

        self.transaction = Transaction::Recipients(accepted + 1);
        Ok(())
    }

    /// Transmits the message and completes the transaction.
    ///
    /// Line endings are normalized to CRLF and leading dots are stuffed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if no recipient was accepted and `SendFailed`
    /// if DATA or the end of data is not accepted.
    pub async fn data(&mut self, message: &[u8]) -> Result<()> {
        if !matches!(self.transaction, Transaction::Recipients(n) if n > 0) {
            return Err(Error::InvalidState(
                "DATA without accepted recipients".to_string(),
            ));
        }

        let reply = self
            .session_command(&Command::Data, &[State::Connected, State::Authenticated])
            .await?;
        if !reply.is(ReplyCode::START_DATA) {
            return Err(Error::SendFailed(format!(
                "DATA rejected: {} {}",
                reply.code,
                reply.message_text()
            )));
        }

        let previous = self.begin(&Command::Data, &[State::Connected, State::Authenticated])?;
        let outcome = self.transmit(&encode_data(message)).await;
        self.state = previous;
        self.transaction = Transaction::Idle;

        let reply = outcome?;
        if !reply.is(ReplyCode::OK) {
            return Err(Error::SendFailed(format!(
                "message rejected: {} {}",
                reply.code,
                reply.message_text()
            )));
        }
        Ok(())
    }

    /// Aborts the open transaction with RSET.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer 250.
    pub async fn reset(&mut self) -> Result<()> {
        let reply = self
            .session_command(&Command::Rset, &[State::Connected, State::Authenticated])
            .await?;
        if !reply.is_success() {
            return Err(Error::smtp_error(reply.code.0, reply.message_text()));
        }
        self.transaction = Transaction::Idle;
        Ok(())
    }

    /// Sends one message to every recipient.
    ///
    /// Stops at the first refused recipient. The transaction is left open
    /// with the recipients accepted so far; the caller may call
    /// [`SmtpClient::data`] to deliver to them or [`SmtpClient::reset`] to
    /// abandon the send.
    ///
    /// # Errors
    ///
    /// Returns `NoRecipients` for an empty list, `RecipientRejected` naming
    /// the refused address, or `SendFailed` if the server refuses the
    /// transaction.
    pub async fn send_mail<S: AsRef<str>>(
        &mut self,
        from: &str,
        to: &[S],
        message: &str,
    ) -> Result<()> {
        if to.is_empty() {
            return Err(Error::NoRecipients);
        }

        self.mail_from(from).await?;
        for recipient in to {
            self.rcpt_to(recipient.as_ref()).await?;
        }
        self.data(message.as_bytes()).await?;

        info!(recipients = to.len(), "SMTP message accepted");
        Ok(())
    }

    /// Does nothing, keeping the session alive.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer 2xx.
    pub async fn noop(&mut self) -> Result<()> {
        let reply = self
            .session_command(&Command::Noop, &[State::Connected, State::Authenticated])
            .await?;
        if !reply.is_success() {
            return Err(Error::smtp_error(reply.code.0, reply.message_text()));
        }
        Ok(())
    }

    /// Sends QUIT and closes the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if not connected or QUIT is not acknowledged. The
    /// connection is closed either way.
    pub async fn quit(&mut self) -> Result<()> {
        let outcome = match self
            .session_command(&Command::Quit, &[State::Connected, State::Authenticated])
            .await
        {
            Ok(reply) if reply.is_success() => Ok(()),
            Ok(reply) => Err(Error::smtp_error(reply.code.0, reply.message_text())),
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
                debug!("SMTP QUIT failed: {e}");
            }
        }
        self.close().await;
    }

    async fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                debug!("SMTP close failed: {e}");
            }
            info!(host = %self.config.host, "SMTP disconnected");
        }
        self.reset_session();
    }

    fn reset_session(&mut self) {
        self.transport = None;
        self.buffer.clear();
        self.state = State::Disconnected;
        self.transaction = Transaction::Idle;
        self.tls = false;
        self.capabilities.clear();
    }

    /// Runs one command while marking the client busy.
    async fn session_command(&mut self, command: &Command, allowed: &[State]) -> Result<Reply> {
        let previous = self.begin(command, allowed)?;
        let outcome = self.exchange(command).await;
        self.state = previous;
        outcome
    }

    /// Checks the state and marks the client as busy.
    fn begin(&mut self, command: &Command, allowed: &[State]) -> Result<State> {
        if self.transport.is_none() {
            return Err(Error::NotConnected);
        }
        if !allowed.contains(&self.state) {
            return Err(Error::InvalidState(format!(
                "{command} not allowed while {}",
                self.state
            )));
        }
        Ok(std::mem::take(&mut self.state))
    }

    async fn exchange(&mut self, command: &Command) -> Result<Reply> {
        debug!("SMTP -> {command}");
        self.transmit(&command.serialize()).await
    }

    async fn transmit(&mut self, bytes: &[u8]) -> Result<Reply> {
        let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;
        transport.send(bytes).await?;
        self.read_reply().await
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        loop {
            if let Some(end) = reply_end(&self.buffer) {
                let raw = self.buffer.split_to(end).freeze();
                let reply = parse_reply(&raw)?;
                debug!("SMTP <- {} {}", reply.code, reply.message_text());
                return Ok(reply);
            }

            if self.buffer.len() > MAX_REPLY_BYTES {
                self.buffer.clear();
                warn!("SMTP reply exceeded {MAX_REPLY_BYTES} bytes");
                return Err(Error::Protocol("reply too large".to_string()));
            }

            let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;
            let received = transport.receive_some().await?;
            if received.data.is_empty() {
                return Err(Error::ConnectionClosed);
            }
            self.buffer.extend_from_slice(&received.data);
        }
    }
}

impl<C: Connector> fmt::Debug for SmtpClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpClient")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("state", &self.state)
            .field("tls", &self.tls)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone)]
mod tests {
    use super::*;
    use mailkeep_transport::ScriptedConnector;
    use tokio_test::io::{Builder, Mock};

    const GREETING: &[u8] = b"220 smtp.example.com ESMTP ready\r\n";
    const EHLO_REPLY: &[u8] = b"250-PIPELINING\r\n250-SIZE 10240000\r\n250 AUTH LOGIN\r\n";

    fn config() -> ServerConfig {
        ServerConfig::submission("smtp.example.com", 465, true)
    }

    fn client(mock: Mock) -> SmtpClient<ScriptedConnector> {
        SmtpClient::with_connector(config(), ScriptedConnector::new().with(mock))
    }

    fn logged_in(builder: &mut Builder) -> &mut Builder {
        builder
            .read(GREETING)
            .write(b"EHLO client.local\r\n")
            .read(EHLO_REPLY)
            .write(b"AUTH LOGIN\r\n")
            .read(b"334 VXNlcm5hbWU6\r\n")
            .write(b"YWxpY2U=\r\n")
            .read(b"334 UGFzc3dvcmQ6\r\n")
            .write(b"aHVudGVyMg==\r\n")
            .read(b"235 2.7.0 Authentication successful\r\n")
    }

    async fn authenticated(mock: Mock) -> SmtpClient<ScriptedConnector> {
        let mut client = client(mock);
        client.connect().await.unwrap();
        client.ehlo("client.local").await.unwrap();
        client.login("alice", "hunter2").await.unwrap();
        client
    }

    #[tokio::test]
    async fn test_connect_reads_greeting() {
        let mut client = client(Builder::new().read(GREETING).build());
        client.connect().await.unwrap();
        assert_eq!(client.state(), State::Connected);
        assert!(client.is_tls());
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_greeting() {
        let mut client = client(Builder::new().read(b"554 no service\r\n").build());
        assert!(matches!(
            client.connect().await.unwrap_err(),
            Error::InvalidResponse(_)
        ));
        assert_eq!(client.state(), State::Disconnected);
    }

    #[tokio::test]
    async fn test_ehlo_returns_extension_lines() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"EHLO client.local\r\n")
            .read(EHLO_REPLY)
            .build();
        let mut client = client(mock);
        client.connect().await.unwrap();

        let lines = client.ehlo("client.local").await.unwrap();
        assert_eq!(
            lines,
            vec!["250-PIPELINING", "250-SIZE 10240000", "250 AUTH LOGIN"]
        );
        assert!(client.supports("AUTH"));
        assert!(client.supports("size"));
        assert!(!client.supports("STARTTLS"));
    }

    #[tokio::test]
    async fn test_reply_split_across_reads() {
        let mock = Builder::new()
            .read(b"220 ready")
            .read(b"\r\n")
            .write(b"EHLO client.local\r\n")
            .read(b"250-PIPEL")
            .read(b"INING\r\n250 OK\r\n")
            .build();
        let mut client = client(mock);
        client.connect().await.unwrap();
        assert_eq!(client.ehlo("client.local").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_starttls_handshake() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"EHLO client.local\r\n")
            .read(b"250-smtp.example.com\r\n250 STARTTLS\r\n")
            .write(b"STARTTLS\r\n")
            .read(b"220 2.0.0 Ready to start TLS\r\n")
            .write(b"EHLO client.local\r\n")
            .read(EHLO_REPLY)
            .build();
        let connector = ScriptedConnector::new().with(mock);
        let mut client = SmtpClient::with_connector(
            ServerConfig::submission("smtp.example.com", 587, true),
            connector.clone(),
        );

        client.connect().await.unwrap();
        assert!(!client.is_tls());

        let lines = client.handshake("client.local").await.unwrap();
        assert_eq!(lines.len(), 3);
        assert!(client.is_tls());
        assert_eq!(connector.upgrades(), 1);
        assert_eq!(client.state(), State::Connected);
    }

    #[tokio::test]
    async fn test_starttls_refused() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"STARTTLS\r\n")
            .read(b"454 TLS not available\r\n")
            .build();
        let mut client = SmtpClient::with_connector(
            ServerConfig::submission("smtp.example.com", 587, true),
            ScriptedConnector::new().with(mock),
        );
        client.connect().await.unwrap();

        let err = client.starttls().await.unwrap_err();
        assert!(matches!(err, Error::SmtpError { code: 454, .. }));
        assert_eq!(client.state(), State::Connected);
    }

    #[tokio::test]
    async fn test_login() {
        let client = authenticated(logged_in(&mut Builder::new()).build()).await;
        assert_eq!(client.state(), State::Authenticated);
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"AUTH LOGIN\r\n")
            .read(b"334 VXNlcm5hbWU6\r\n")
            .write(b"YWxpY2U=\r\n")
            .read(b"334 UGFzc3dvcmQ6\r\n")
            .write(b"d3Jvbmc=\r\n")
            .read(b"535 5.7.8 Authentication credentials invalid\r\n")
            .build();
        let mut client = client(mock);
        client.connect().await.unwrap();

        let err = client.login("alice", "wrong").await.unwrap_err();
        assert!(err.is_authentication());
        assert_eq!(client.state(), State::Connected);
    }

    #[tokio::test]
    async fn test_send_mail() {
        let mock = logged_in(&mut Builder::new())
            .write(b"MAIL FROM:<alice@example.com>\r\n")
            .read(b"250 OK\r\n")
            .write(b"RCPT TO:<bob@example.com>\r\n")
            .read(b"250 OK\r\n")
            .write(b"RCPT TO:<carol@example.com>\r\n")
            .read(b"250 OK\r\n")
            .write(b"DATA\r\n")
            .read(b"354 End data with <CR><LF>.<CR><LF>\r\n")
            .write(b"Subject: Hi\r\n\r\n..dotted\r\n.\r\n")
            .read(b"250 2.0.0 queued as 1234\r\n")
            .build();
        let mut client = authenticated(mock).await;

        client
            .send_mail(
                "alice@example.com",
                &["bob@example.com", "carol@example.com"],
                "Subject: Hi\n\n.dotted\n",
            )
            .await
            .unwrap();
        assert_eq!(client.state(), State::Authenticated);
    }

    #[tokio::test]
    async fn test_send_mail_recipient_rejected() {
        let mock = logged_in(&mut Builder::new())
            .write(b"MAIL FROM:<alice@example.com>\r\n")
            .read(b"250 OK\r\n")
            .write(b"RCPT TO:<bob@example.com>\r\n")
            .read(b"250 OK\r\n")
            .write(b"RCPT TO:<nobody@example.com>\r\n")
            .read(b"550 5.1.1 No such user\r\n")
            .write(b"RSET\r\n")
            .read(b"250 OK\r\n")
            .build();
        let mut client = authenticated(mock).await;

        let err = client
            .send_mail(
                "alice@example.com",
                &["bob@example.com", "nobody@example.com"],
                "Subject: Hi\r\n\r\nbody",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RecipientRejected(ref addr) if addr == "nobody@example.com"));

        client.reset().await.unwrap();
        assert_eq!(client.state(), State::Authenticated);
    }

    #[tokio::test]
    async fn test_send_mail_without_recipients() {
        let mut client = authenticated(logged_in(&mut Builder::new()).build()).await;
        let empty: [&str; 0] = [];
        assert!(matches!(
            client.send_mail("alice@example.com", &empty, "x").await,
            Err(Error::NoRecipients)
        ));
    }

    #[tokio::test]
    async fn test_message_rejected_after_data() {
        let mock = logged_in(&mut Builder::new())
            .write(b"MAIL FROM:<alice@example.com>\r\n")
            .read(b"250 OK\r\n")
            .write(b"RCPT TO:<bob@example.com>\r\n")
            .read(b"250 OK\r\n")
            .write(b"DATA\r\n")
            .read(b"354 go ahead\r\n")
            .write(b"spam\r\n.\r\n")
            .read(b"554 5.7.1 Message rejected\r\n")
            .build();
        let mut client = authenticated(mock).await;

        let err = client
            .send_mail("alice@example.com", &["bob@example.com"], "spam")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SendFailed(_)));
    }

    #[tokio::test]
    async fn test_transaction_order_enforced() {
        let mut client = authenticated(logged_in(&mut Builder::new()).build()).await;
        assert!(matches!(
            client.rcpt_to("bob@example.com").await,
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            client.data(b"x").await,
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_not_connected() {
        let mut client = SmtpClient::with_connector(config(), ScriptedConnector::new());
        assert!(matches!(
            client.ehlo("client.local").await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_sends_quit() {
        let mock = logged_in(&mut Builder::new())
            .write(b"QUIT\r\n")
            .read(b"221 2.0.0 Bye\r\n")
            .build();
        let mut client = authenticated(mock).await;
        client.disconnect().await;
        assert_eq!(client.state(), State::Disconnected);
    }

    #[tokio::test]
    async fn test_connection_closed_mid_reply() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"EHLO client.local\r\n")
            .read(b"250-PIPELINING\r\n")
            .build();
        let mut client = client(mock);
        client.connect().await.unwrap();
        let err = client.ehlo("client.local").await.unwrap_err();
        assert!(err.is_connection());
    }
}
