//! IMAP client state machine.

use std::fmt;
use std::ops::RangeInclusive;

use bytes::BytesMut;
use mailkeep_transport::{Connector, ServerConfig, TcpConnector, Transport};
use tracing::{debug, info};

use crate::response::{
    FolderStatus, MailboxEntry, TaggedResponse, TaggedScanner, extract_header_blocks,
    find_crlf, parse_list_line, parse_select, quote,
};
use crate::tag::TagGenerator;
use crate::{Error, Result};

/// Connection state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum State {
    /// No usable connection.
    #[default]
    Disconnected,
    /// Greeting received, not logged in.
    Connected,
    /// Logged in, no mailbox selected.
    Authenticated,
    /// Mailbox selected.
    Selected(String),
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connected => f.write_str("connected"),
            Self::Authenticated => f.write_str("authenticated"),
            Self::Selected(name) => write!(f, "selected ({name})"),
        }
    }
}

/// IMAP client owning a single connection.
///
/// Every operation takes `&mut self`, so commands on one client are strictly
/// sequential. While a command is in flight the client reports
/// [`State::Disconnected`]; the previous state is restored when the command
/// returns. Dropping an in-flight future therefore leaves the client
/// disconnected and it must be reconnected before reuse.
pub struct ImapClient<C: Connector = TcpConnector> {
    config: ServerConfig,
    connector: C,
    transport: Option<Transport<C::Stream>>,
    buffer: BytesMut,
    tags: TagGenerator,
    state: State,
}

impl ImapClient<TcpConnector> {
    /// Creates a client that connects over TCP.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self::with_connector(config, TcpConnector)
    }
}

impl<C: Connector> ImapClient<C> {
    /// Creates a client that obtains its connection from `connector`.
    #[must_use]
    pub fn with_connector(config: ServerConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            transport: None,
            buffer: BytesMut::new(),
            tags: TagGenerator::default(),
            state: State::Disconnected,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> &State {
        &self.state
    }

    /// Returns the server configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Opens the connection and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is already connected, the connection
    /// cannot be opened, or the greeting does not contain `OK`.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state != State::Disconnected {
            return Err(Error::InvalidState(format!(
                "connect called while {}",
                self.state
            )));
        }

        self.transport = None;
        self.buffer.clear();
        self.tags.reset();
        self.transport = Some(self.connector.connect(&self.config).await?);

        let greeting = self.read_line().await?;
        debug!("IMAP <- {}", greeting.trim_end());
        if !greeting.contains("OK") {
            self.transport = None;
            return Err(Error::InvalidResponse(greeting));
        }

        self.state = State::Connected;
        info!(host = %self.config.host, "IMAP connected");
        Ok(())
    }

    /// Logs in with a username and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationFailed` unless the server answers the tagged
    /// LOGIN with OK.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let previous = self.begin("LOGIN", |s| matches!(s, State::Connected))?;

        let command = format!("LOGIN {} {}", quote(username), quote(password));
        let shown = format!("LOGIN {} [redacted]", quote(username));
        let outcome = self.execute(&command, &shown).await;

        match outcome {
            Ok(response) if response.is_ok() => {
                self.state = State::Authenticated;
                info!(username, "IMAP authenticated");
                Ok(())
            }
            Ok(response) => {
                debug!("IMAP LOGIN rejected: {}", response.text);
                self.state = previous;
                Err(Error::AuthenticationFailed)
            }
            Err(e) => {
                self.state = previous;
                Err(e)
            }
        }
    }

    /// Lists all mailboxes with their attributes and delimiter.
    ///
    /// # Errors
    ///
    /// Returns an error if not authenticated or the server refuses LIST.
    pub async fn list_mailboxes(&mut self) -> Result<Vec<MailboxEntry>> {
        let previous = self.begin("LIST", State::is_authenticated)?;
        let outcome = self.execute("LIST \"\" \"*\"", "LIST \"\" \"*\"").await;
        self.state = previous;

        let response = outcome?.into_ok()?;
        let text = response.text_lossy();
        Ok(text.lines().filter_map(parse_list_line).collect())
    }

    /// Lists all mailbox names.
    ///
    /// # Errors
    ///
    /// Returns an error if not authenticated or the server refuses LIST.
    pub async fn list_folders(&mut self) -> Result<Vec<String>> {
        Ok(self
            .list_mailboxes()
            .await?
            .into_iter()
            .map(|entry| entry.name)
            .collect())
    }

    /// Selects a mailbox and reports its status.
    ///
    /// # Errors
    ///
    /// Returns an error if not authenticated or the server refuses SELECT.
    /// A refused SELECT leaves the client authenticated with no mailbox
    /// selected.
    pub async fn select_folder(&mut self, name: &str) -> Result<FolderStatus> {
        let previous = self.begin("SELECT", State::is_authenticated)?;

        let command = format!("SELECT {}", quote(name));
        let outcome = self.execute(&command, &command).await;

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                self.state = previous;
                return Err(e);
            }
        };

        match response.into_ok() {
            Ok(response) => {
                let status = parse_select(&response.text_lossy());
                self.state = State::Selected(name.to_string());
                debug!(
                    folder = name,
                    exists = status.message_count,
                    uid_next = ?status.uid_next,
                    "IMAP folder selected"
                );
                Ok(status)
            }
            Err(e) => {
                self.state = State::Authenticated;
                Err(e)
            }
        }
    }

    /// Fetches the header block of every message in a sequence range.
    ///
    /// Returns one raw header block per message. If no block can be located
    /// the whole response is returned as the only element.
    ///
    /// # Errors
    ///
    /// Returns an error if no mailbox is selected, the range is empty or
    /// starts at zero, or the server refuses FETCH.
    pub async fn fetch_headers(&mut self, range: RangeInclusive<u32>) -> Result<Vec<String>> {
        let (lo, hi) = range.into_inner();
        if lo == 0 || lo > hi {
            return Err(Error::InvalidArgument(format!(
                "invalid sequence range {lo}:{hi}"
            )));
        }

        let previous = self.begin("FETCH", |s| matches!(s, State::Selected(_)))?;
        let command = format!("FETCH {lo}:{hi} (BODY.PEEK[HEADER])");
        let outcome = self.execute(&command, &command).await;
        self.state = previous;

        let response = outcome?.into_ok()?;
        Ok(extract_header_blocks(&response.raw))
    }

    /// Sends LOGOUT and waits for the server to acknowledge it.
    ///
    /// # Errors
    ///
    /// Returns an error if not connected or the exchange fails.
    pub async fn logout(&mut self) -> Result<()> {
        self.begin("LOGOUT", |s| *s != State::Disconnected)?;
        self.execute("LOGOUT", "LOGOUT").await?.into_ok()?;
        Ok(())
    }

    /// Ends the session.
    ///
    /// Sends LOGOUT if the session is usable, ignoring its outcome, then
    /// always closes the connection.
    pub async fn disconnect(&mut self) {
        if self.state != State::Disconnected {
            if let Err(e) = self.logout().await {
                debug!("IMAP LOGOUT failed: {e}");
            }
        }
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                debug!("IMAP close failed: {e}");
            }
        }
        self.buffer.clear();
        self.state = State::Disconnected;
        info!(host = %self.config.host, "IMAP disconnected");
    }

    /// Checks the state and marks the client as busy.
    ///
    /// Returns the state to restore once the command completes.
    fn begin(&mut self, command: &str, allowed: impl Fn(&State) -> bool) -> Result<State> {
        if self.transport.is_none() {
            return Err(Error::NotConnected);
        }
        if !allowed(&self.state) {
            return Err(Error::InvalidState(format!(
                "{command} not allowed while {}",
                self.state
            )));
        }
        Ok(std::mem::take(&mut self.state))
    }

    /// Sends one tagged command and reads through its completion line.
    ///
    /// `shown` is what gets logged in place of the command.
    async fn execute(&mut self, command: &str, shown: &str) -> Result<TaggedResponse> {
        let tag = self.tags.next();
        debug!("IMAP -> {tag} {shown}");

        let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;
        transport
            .send(format!("{tag} {command}\r\n").as_bytes())
            .await?;

        let mut scanner = TaggedScanner::new(&tag);
        let end = loop {
            if let Some(end) = scanner.advance(&self.buffer)? {
                break end;
            }
            self.fill().await?;
        };

        let raw = self.buffer.split_to(end).to_vec();
        let response = TaggedResponse::parse(&tag, raw)?;
        debug!("IMAP <- {tag} {:?} {}", response.status, response.text);
        Ok(response)
    }

    /// Reads one CRLF-terminated line.
    async fn read_line(&mut self) -> Result<String> {
        loop {
            if let Some(pos) = find_crlf(&self.buffer) {
                let line = self.buffer.split_to(pos + 2);
                return Ok(String::from_utf8_lossy(&line).into_owned());
            }
            self.fill().await?;
        }
    }

    async fn fill(&mut self) -> Result<()> {
        let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;
        let received = transport.receive_some().await?;
        if received.data.is_empty() {
            return Err(Error::ConnectionClosed);
        }
        self.buffer.extend_from_slice(&received.data);
        Ok(())
    }
}

impl State {
    /// Returns true once LOGIN has succeeded.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated | Self::Selected(_))
    }
}

impl<C: Connector> fmt::Debug for ImapClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapClient")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone)]
mod tests {
    use super::*;
    use mailkeep_transport::ScriptedConnector;
    use tokio_test::io::Builder;

    const GREETING: &[u8] = b"* OK [CAPABILITY IMAP4rev1] Dovecot ready.\r\n";

    fn config() -> ServerConfig {
        ServerConfig::incoming("imap.example.com", 993, true)
    }

    fn client(mock: tokio_test::io::Mock) -> ImapClient<ScriptedConnector> {
        ImapClient::with_connector(config(), ScriptedConnector::new().with(mock))
    }

    #[tokio::test]
    async fn test_connect_reads_greeting() {
        let mut client = client(Builder::new().read(GREETING).build());
        client.connect().await.unwrap();
        assert_eq!(client.state(), &State::Connected);
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_greeting() {
        let mut client = client(Builder::new().read(b"* BYE go away\r\n").build());
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)));
        assert_eq!(client.state(), &State::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let mut client =
            ImapClient::with_connector(config(), ScriptedConnector::new().refusing());
        let err = client.connect().await.unwrap_err();
        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn test_login_success() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"A0001 LOGIN \"user@example.com\" \"secret\"\r\n")
            .read(b"A0001 OK LOGIN completed\r\n")
            .build();
        let mut client = client(mock);
        client.connect().await.unwrap();
        client.login("user@example.com", "secret").await.unwrap();
        assert_eq!(client.state(), &State::Authenticated);
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"A0001 LOGIN \"user@example.com\" \"wrong\"\r\n")
            .read(b"A0001 NO [AUTHENTICATIONFAILED] Authentication failed.\r\n")
            .build();
        let mut client = client(mock);
        client.connect().await.unwrap();
        let err = client.login("user@example.com", "wrong").await.unwrap_err();
        assert!(err.is_authentication());
        assert_eq!(client.state(), &State::Connected);
    }

    #[tokio::test]
    async fn test_login_requires_connection() {
        let mut client = client(Builder::new().build());
        let err = client.login("user", "pass").await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn test_list_folders() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"A0001 LOGIN \"u\" \"p\"\r\n")
            .read(b"A0001 OK\r\n")
            .write(b"A0002 LIST \"\" \"*\"\r\n")
            .read(b"* LIST (\\HasNoChildren) \"/\" \"INBOX\"\r\n* LIST (\\HasNoChildren) \"/\" \"Sent Items\"\r\n")
            .read(b"* LIST (\\Noselect) \"/\" \"[Gmail]\"\r\nA0002 OK LIST completed\r\n")
            .build();
        let mut client = client(mock);
        client.connect().await.unwrap();
        client.login("u", "p").await.unwrap();

        let folders = client.list_folders().await.unwrap();
        assert_eq!(folders, vec!["INBOX", "Sent Items", "[Gmail]"]);
        assert_eq!(client.state(), &State::Authenticated);
    }

    #[tokio::test]
    async fn test_select_folder() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"A0001 LOGIN \"u\" \"p\"\r\n")
            .read(b"A0001 OK\r\n")
            .write(b"A0002 SELECT \"INBOX\"\r\n")
            .read(b"* 172 EXISTS\r\n* OK [UIDNEXT 305] Predicted next UID\r\nA0002 OK [READ-WRITE] SELECT completed\r\n")
            .build();
        let mut client = client(mock);
        client.connect().await.unwrap();
        client.login("u", "p").await.unwrap();

        let status = client.select_folder("INBOX").await.unwrap();
        assert_eq!(status.message_count, 172);
        assert_eq!(status.uid_next, Some(305));
        assert_eq!(client.state(), &State::Selected("INBOX".to_string()));
    }

    #[tokio::test]
    async fn test_select_refused_leaves_authenticated() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"A0001 LOGIN \"u\" \"p\"\r\n")
            .read(b"A0001 OK\r\n")
            .write(b"A0002 SELECT \"Missing\"\r\n")
            .read(b"A0002 NO Mailbox doesn't exist\r\n")
            .build();
        let mut client = client(mock);
        client.connect().await.unwrap();
        client.login("u", "p").await.unwrap();

        let err = client.select_folder("Missing").await.unwrap_err();
        assert!(matches!(err, Error::No(_)));
        assert_eq!(client.state(), &State::Authenticated);
    }

    #[tokio::test]
    async fn test_fetch_headers() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"A0001 LOGIN \"u\" \"p\"\r\n")
            .read(b"A0001 OK\r\n")
            .write(b"A0002 SELECT \"INBOX\"\r\n")
            .read(b"* 2 EXISTS\r\nA0002 OK\r\n")
            .write(b"A0003 FETCH 1:2 (BODY.PEEK[HEADER])\r\n")
            .read(b"* 1 FETCH (BODY[HEADER] {18}\r\nSubject: one\r\n\r\n\r\n)\r\n")
            .read(b"* 2 FETCH (BODY[HEADER] {18}\r\nSubject: two\r\n\r\n\r\n)\r\nA0003 OK FETCH completed\r\n")
            .build();
        let mut client = client(mock);
        client.connect().await.unwrap();
        client.login("u", "p").await.unwrap();
        client.select_folder("INBOX").await.unwrap();

        let blocks = client.fetch_headers(1..=2).await.unwrap();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].starts_with("Subject: one"));
        assert!(blocks[1].starts_with("Subject: two"));
    }

    #[tokio::test]
    async fn test_fetch_requires_selected() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"A0001 LOGIN \"u\" \"p\"\r\n")
            .read(b"A0001 OK\r\n")
            .build();
        let mut client = client(mock);
        client.connect().await.unwrap();
        client.login("u", "p").await.unwrap();

        let err = client.fetch_headers(1..=5).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        let err = client.fetch_headers(0..=5).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_io_error_keeps_session() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"A0001 LOGIN \"u\" \"p\"\r\n")
            .read(b"A0001 OK\r\n")
            .write(b"A0002 SELECT \"A\"\r\n")
            .read_error(std::io::Error::other("glitch"))
            .write(b"A0003 SELECT \"B\"\r\n")
            .read(b"* 1 EXISTS\r\nA0003 OK\r\n")
            .build();
        let mut client = client(mock);
        client.connect().await.unwrap();
        client.login("u", "p").await.unwrap();

        assert!(client.select_folder("A").await.unwrap_err().is_connection());
        assert_eq!(client.state(), &State::Authenticated);
        let status = client.select_folder("B").await.unwrap();
        assert_eq!(status.message_count, 1);
    }

    #[tokio::test]
    async fn test_disconnect_sends_logout() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"A0001 LOGOUT\r\n")
            .read(b"* BYE Logging out\r\nA0001 OK Logout completed.\r\n")
            .build();
        let mut client = client(mock);
        client.connect().await.unwrap();
        client.disconnect().await;
        assert_eq!(client.state(), &State::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_when_never_connected() {
        let mut client = client(Builder::new().build());
        client.disconnect().await;
        assert_eq!(client.state(), &State::Disconnected);
    }

    #[tokio::test]
    async fn test_cancelled_command_leaves_disconnected() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"A0001 LOGIN \"u\" \"p\"\r\n")
            .read(b"A0001 OK\r\n")
            .write(b"A0002 LIST \"\" \"*\"\r\n")
            .wait(std::time::Duration::from_secs(3600))
            .build();
        let mut client = client(mock);
        client.connect().await.unwrap();
        client.login("u", "p").await.unwrap();

        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            client.list_folders(),
        )
        .await;
        assert!(pending.is_err());
        assert_eq!(client.state(), &State::Disconnected);
        assert!(matches!(
            client.list_folders().await.unwrap_err(),
            Error::InvalidState(_)
        ));
    }
}
