//! Downloads mail into the cache, one implementation per protocol.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mailkeep_imap::{ImapClient, MailboxEntry};
use mailkeep_mime::ParsedMessage;
use mailkeep_pop3::{Pop3Client, State as Pop3State};
use mailkeep_transport::{Connector, ServerConfig, TcpConnector};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::retry::{RetryPolicy, retry};
use crate::Result;
use crate::account::{Account, CredentialStore, IncomingServer};
use crate::cache::{CacheRepository, ImapFolder, Message};

/// Tuning for sync passes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncOptions {
    /// Most recent messages fetched per IMAP folder, and the highest POP3
    /// message number downloaded.
    pub messages_per_folder: u32,
    /// Retry policy for opening the connection.
    pub retry: RetryPolicy,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// Read/write timeout.
    pub io_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            messages_per_folder: 50,
            retry: RetryPolicy::default(),
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(60),
        }
    }
}

impl SyncOptions {
    fn apply(&self, mut config: ServerConfig) -> ServerConfig {
        config.connect_timeout = self.connect_timeout;
        config.io_timeout = self.io_timeout;
        config
    }
}

/// Syncs single accounts into the cache.
pub struct MailSyncService<C: Connector + Clone = TcpConnector> {
    connector: C,
    repository: Arc<CacheRepository>,
    credentials: Arc<dyn CredentialStore>,
    options: SyncOptions,
}

impl<C: Connector + Clone> MailSyncService<C> {
    /// Creates a service with default options.
    #[must_use]
    pub fn new(
        connector: C,
        repository: Arc<CacheRepository>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            connector,
            repository,
            credentials,
            options: SyncOptions::default(),
        }
    }

    /// Replaces the options.
    #[must_use]
    pub const fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the cache this service writes to.
    #[must_use]
    pub const fn repository(&self) -> &Arc<CacheRepository> {
        &self.repository
    }

    /// Syncs one account and returns the number of messages stored.
    ///
    /// Folders and messages that fail are logged and skipped. The
    /// connection is always closed, whatever happened after it opened.
    ///
    /// # Errors
    ///
    /// Returns an error if the account has no incoming server, no stored
    /// password, cannot be connected to (after retries) or fails to log in,
    /// or if the folder list cannot be read.
    pub async fn sync(&self, account: &Account) -> Result<usize> {
        info!(account = %account.id, email = %account.email, "Sync started");
        let synced = match account.incoming()? {
            IncomingServer::Imap(config) => self.sync_imap(account, self.options.apply(config)).await?,
            IncomingServer::Pop3(config) => self.sync_pop3(account, self.options.apply(config)).await?,
        };
        info!(account = %account.id, synced, "Sync finished");
        Ok(synced)
    }

    async fn sync_imap(&self, account: &Account, config: ServerConfig) -> Result<usize> {
        let password = self.credentials.retrieve(account.id.as_str())?;
        let mut client = retry(&self.options.retry, || {
            let mut client = ImapClient::with_connector(config.clone(), self.connector.clone());
            async move { client.connect().await.map(|()| client) }
        })
        .await?;

        let outcome = self.imap_session(&mut client, account, &password).await;
        client.disconnect().await;
        outcome
    }

    async fn imap_session(
        &self,
        client: &mut ImapClient<C>,
        account: &Account,
        password: &str,
    ) -> Result<usize> {
        client.login(&account.email, password).await?;
        let mailboxes = client.list_mailboxes().await?;

        let known: HashMap<String, ImapFolder> = self
            .repository
            .list_folders(&account.id)
            .await?
            .into_iter()
            .map(|folder| (folder.id.clone(), folder))
            .collect();

        let mut synced = 0;
        for mailbox in &mailboxes {
            if !mailbox.is_selectable() {
                debug!(folder = %mailbox.name, "Skipping unselectable folder");
                continue;
            }
            match self.sync_folder(client, account, mailbox, &known).await {
                Ok(count) => synced += count,
                Err(e) => warn!(account = %account.id, folder = %mailbox.name, "Folder skipped: {e}"),
            }
        }
        Ok(synced)
    }

    async fn sync_folder(
        &self,
        client: &mut ImapClient<C>,
        account: &Account,
        mailbox: &MailboxEntry,
        known: &HashMap<String, ImapFolder>,
    ) -> Result<usize> {
        let status = client.select_folder(&mailbox.name).await?;

        let folder = ImapFolder {
            id: ImapFolder::folder_id(&account.id, &mailbox.name),
            account_id: account.id.clone(),
            name: mailbox.leaf_name().to_string(),
            full_path: mailbox.name.clone(),
            parent_id: mailbox
                .parent_name()
                .map(|parent| ImapFolder::folder_id(&account.id, parent)),
            uid_validity: status.uid_validity,
            uid_next: status.uid_next,
        };
        if let Some(previous) = known.get(&folder.id) {
            if folder.uid_validity_changed(previous) {
                warn!(
                    folder = %folder.full_path,
                    old = ?previous.uid_validity,
                    new = ?folder.uid_validity,
                    "UIDVALIDITY changed, cached UIDs for this folder are stale"
                );
            }
        }
        self.repository
            .upsert_folders(std::slice::from_ref(&folder))
            .await?;

        let wanted = status.message_count.min(self.options.messages_per_folder);
        if wanted == 0 {
            return Ok(0);
        }
        let first = status.message_count - wanted + 1;
        let blocks = client.fetch_headers(first..=status.message_count).await?;

        let messages: Vec<Message> = blocks
            .iter()
            .filter_map(|block| match mailkeep_mime::parse(block) {
                Ok(parsed) => Some(Message::from_parsed(
                    without_empty_body(parsed),
                    account.id.clone(),
                    Some(folder.id.clone()),
                    || Uuid::new_v4().to_string(),
                    0,
                )),
                Err(e) => {
                    warn!(folder = %folder.full_path, "Header block skipped: {e}");
                    None
                }
            })
            .collect();

        self.repository.save_messages(&messages).await?;
        debug!(folder = %folder.full_path, count = messages.len(), "Folder synced");
        Ok(messages.len())
    }

    async fn sync_pop3(&self, account: &Account, config: ServerConfig) -> Result<usize> {
        let password = self.credentials.retrieve(account.id.as_str())?;
        let mut client = retry(&self.options.retry, || {
            let mut client = Pop3Client::with_connector(config.clone(), self.connector.clone());
            async move { client.connect().await.map(|()| client) }
        })
        .await?;

        let outcome = self.pop3_session(&mut client, account, &password).await;
        client.disconnect().await;
        outcome
    }

    async fn pop3_session(
        &self,
        client: &mut Pop3Client<C>,
        account: &Account,
        password: &str,
    ) -> Result<usize> {
        client.login(&account.email, password).await?;
        let stat = client.stat().await?;

        let uids: HashMap<u32, String> = match client.uidl().await {
            Ok(entries) => entries
                .into_iter()
                .map(|entry| (entry.number, entry.uid))
                .collect(),
            Err(mailkeep_pop3::Error::Rejected(text)) => {
                debug!("UIDL not supported: {text}");
                HashMap::new()
            }
            Err(e) => return Err(e.into()),
        };
        let downloaded = self.repository.known_uidls(&account.id).await?;

        let last = stat.count.min(self.options.messages_per_folder);
        let mut synced = 0;
        for number in 1..=last {
            let uid = uids.get(&number).map(String::as_str);
            if uid.is_some_and(|uid| downloaded.contains(uid)) {
                debug!(number, "Already downloaded");
                continue;
            }
            match self.fetch_pop3_message(client, account, number, uid).await {
                Ok(()) => synced += 1,
                Err(e) if client.state() != Pop3State::Authenticated => return Err(e),
                Err(e) => warn!(account = %account.id, number, "Message skipped: {e}"),
            }
        }
        Ok(synced)
    }

    async fn fetch_pop3_message(
        &self,
        client: &mut Pop3Client<C>,
        account: &Account,
        number: u32,
        uid: Option<&str>,
    ) -> Result<()> {
        let raw = client.retrieve(number).await?;
        let parsed = mailkeep_mime::parse(&raw)?;

        let message = Message::from_parsed(
            parsed,
            account.id.clone(),
            None,
            || uid.map_or_else(|| Uuid::new_v4().to_string(), |uid| format!("{}-{uid}", account.id)),
            raw.len() as u64,
        );
        self.repository.save_messages(&[message]).await?;

        if let Some(uid) = uid {
            self.repository.record_uidl(&account.id, uid).await?;
        }
        Ok(())
    }
}

/// A header-only fetch parses with an empty body; store none instead.
fn without_empty_body(mut parsed: ParsedMessage) -> ParsedMessage {
    parsed.body_plain = parsed.body_plain.filter(|body| !body.is_empty());
    parsed.body_html = parsed.body_html.filter(|body| !body.is_empty());
    parsed
}
