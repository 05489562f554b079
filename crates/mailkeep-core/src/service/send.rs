//! Outgoing mail: compose, deliver over SMTP, or keep for later.

use std::sync::Arc;

use mailkeep_mime::Draft;
use mailkeep_smtp::SmtpClient;
use mailkeep_transport::{Connector, TcpConnector};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::outbox::{OfflineQueue, QueuedMessage};
use super::retry::{RetryPolicy, retry};
use crate::account::{Account, CredentialStore};
use crate::cache::{CacheRepository, Message};
use crate::{Error, Result};

/// What happened to a message handed to [`MailSender::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The server accepted the message.
    Sent,
    /// The server was unreachable; the message waits in the offline queue
    /// under this entry id.
    Queued(String),
}

/// Result of draining the offline queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Messages delivered.
    pub sent: usize,
    /// Messages dropped after a permanent failure.
    pub failed: usize,
    /// Messages still queued.
    pub remaining: usize,
}

/// Sends mail for cached accounts.
pub struct MailSender<C: Connector + Clone = TcpConnector> {
    connector: C,
    repository: Arc<CacheRepository>,
    credentials: Arc<dyn CredentialStore>,
    outbox: Arc<OfflineQueue>,
    retry: RetryPolicy,
}

impl<C: Connector + Clone> MailSender<C> {
    /// Creates a sender.
    #[must_use]
    pub fn new(
        connector: C,
        repository: Arc<CacheRepository>,
        credentials: Arc<dyn CredentialStore>,
        outbox: Arc<OfflineQueue>,
    ) -> Self {
        Self {
            connector,
            repository,
            credentials,
            outbox,
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the retry policy for opening SMTP connections.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the offline queue.
    #[must_use]
    pub const fn outbox(&self) -> &Arc<OfflineQueue> {
        &self.outbox
    }

    /// Composes and sends a draft.
    ///
    /// If the server cannot be reached the composed message is queued and
    /// `Queued` is returned.
    ///
    /// # Errors
    ///
    /// Returns composition errors, authentication failures, recipient
    /// rejections and other non-connection failures.
    pub async fn send(&self, account: &Account, draft: &Draft) -> Result<SendOutcome> {
        let raw = draft.compose()?;
        self.send_raw(account, &draft.from.email, &draft.envelope_recipients(), &raw)
            .await
    }

    /// Sends an already composed message.
    ///
    /// # Errors
    ///
    /// Same as [`MailSender::send`].
    pub async fn send_raw(
        &self,
        account: &Account,
        from: &str,
        recipients: &[String],
        raw: &str,
    ) -> Result<SendOutcome> {
        match self.deliver(account, from, recipients, raw).await {
            Ok(()) => {
                self.record_sent(account, raw).await;
                Ok(SendOutcome::Sent)
            }
            Err(e) if e.is_connection_class() => {
                let entry = QueuedMessage::new(account.id.clone(), from, recipients.to_vec(), raw);
                let id = entry.id.clone();
                warn!(account = %account.id, entry = %id, "Server unreachable, message queued: {e}");
                self.outbox.enqueue(entry);
                Ok(SendOutcome::Queued(id))
            }
            Err(e) => Err(e),
        }
    }

    /// Retries queued messages, oldest first.
    ///
    /// Stops at the first message that fails for connection reasons and
    /// puts it back at the front. A message that fails for any other
    /// reason, or whose account is gone, is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the account lookup fails; the message being
    /// processed is put back first.
    pub async fn flush_outbox(&self) -> Result<FlushReport> {
        let mut report = FlushReport::default();

        while let Some(mut entry) = self.outbox.dequeue() {
            let account = match self.repository.get_account(&entry.account_id).await {
                Ok(Some(account)) => account,
                Ok(None) => {
                    warn!(entry = %entry.id, "Dropping queued message of a removed account");
                    report.failed += 1;
                    continue;
                }
                Err(e) => {
                    self.outbox.requeue_front(entry);
                    return Err(e);
                }
            };

            match self
                .deliver(&account, &entry.from, &entry.recipients, &entry.raw)
                .await
            {
                Ok(()) => {
                    info!(entry = %entry.id, "Queued message sent");
                    self.record_sent(&account, &entry.raw).await;
                    report.sent += 1;
                }
                Err(e) if e.is_connection_class() => {
                    entry.attempts += 1;
                    warn!(entry = %entry.id, attempts = entry.attempts, "Still unreachable: {e}");
                    self.outbox.requeue_front(entry);
                    break;
                }
                Err(e) => {
                    warn!(entry = %entry.id, "Dropping queued message: {e}");
                    report.failed += 1;
                }
            }
        }

        report.remaining = self.outbox.len();
        Ok(report)
    }

    async fn deliver(
        &self,
        account: &Account,
        from: &str,
        recipients: &[String],
        raw: &str,
    ) -> Result<()> {
        let password = self.credentials.retrieve(account.id.as_str())?;
        let config = account.outgoing();

        let mut client = retry(&self.retry, || {
            let mut client = SmtpClient::with_connector(config.clone(), self.connector.clone());
            async move { client.connect().await.map(|()| client) }
        })
        .await?;

        let outcome = transact(&mut client, account, &password, from, recipients, raw).await;
        client.disconnect().await;
        outcome
    }

    /// Keeps a read copy of a sent message in the cache, outside any folder.
    async fn record_sent(&self, account: &Account, raw: &str) {
        let parsed = match mailkeep_mime::parse(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("Sent message not cached: {e}");
                return;
            }
        };

        let mut message = Message::from_parsed(
            parsed,
            account.id.clone(),
            None,
            || Uuid::new_v4().to_string(),
            raw.len() as u64,
        );
        message.is_read = true;

        if let Err(e) = self.repository.save_messages(&[message]).await {
            warn!(account = %account.id, "Failed to cache sent message: {e}");
        }
    }
}

async fn transact<C: Connector>(
    client: &mut SmtpClient<C>,
    account: &Account,
    password: &str,
    from: &str,
    recipients: &[String],
    raw: &str,
) -> Result<()> {
    client.handshake(account.domain()).await?;
    client.login(&account.email, password).await?;

    match client.send_mail(from, recipients, raw).await {
        Ok(()) => Ok(()),
        Err(e @ mailkeep_smtp::Error::RecipientRejected(_)) => {
            if let Err(reset) = client.reset().await {
                debug!("RSET after rejected recipient failed: {reset}");
            }
            Err(Error::from(e))
        }
        Err(e) => Err(e.into()),
    }
}
