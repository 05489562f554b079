//! SQLite storage for accounts, messages, attachments, folders and POP3
//! download bookkeeping.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use tokio::sync::Mutex;
use tracing::debug;

use super::model::{Attachment, ImapFolder, Message};
use crate::account::{Account, AccountId, ServerType};
use crate::Result;

/// How long a connection waits on a locked database.
const BUSY_TIMEOUT: Duration = Duration::from_secs(3);

/// Repository for the local mail cache.
///
/// Reads run concurrently on the pool. Writes are serialized through a
/// single gate, so independent sync tasks can share one repository.
pub struct CacheRepository {
    pool: SqlitePool,
    writer: Mutex<()>,
}

impl std::fmt::Debug for CacheRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRepository").finish_non_exhaustive()
    }
}

impl CacheRepository {
    /// Opens (creating if needed) the database at `path`.
    ///
    /// Missing parent directories are created. The database runs in WAL
    /// mode with foreign keys enforced.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created or
    /// schema creation fails.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let repo = Self::from_pool(pool);
        repo.initialize().await?;
        debug!(path = %path.display(), "Cache opened");
        Ok(repo)
    }

    /// Create an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let repo = Self::from_pool(pool);
        repo.initialize().await?;
        Ok(repo)
    }

    fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            writer: Mutex::new(()),
        }
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                server_type TEXT NOT NULL CHECK (server_type IN ('imap', 'pop3')),
                imap_host TEXT,
                imap_port INTEGER NOT NULL,
                smtp_host TEXT NOT NULL,
                smtp_port INTEGER NOT NULL,
                use_tls INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                message_id TEXT,
                folder_id TEXT,
                subject TEXT,
                sender TEXT,
                recipients TEXT NOT NULL DEFAULT '[]',
                date TEXT,
                size INTEGER NOT NULL DEFAULT 0,
                headers TEXT NOT NULL DEFAULT '{}',
                body_plain TEXT,
                body_html TEXT,
                is_read INTEGER NOT NULL DEFAULT 0,
                is_flagged INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                cached_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS attachments (
                id TEXT PRIMARY KEY,
                message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                filename TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                size INTEGER NOT NULL DEFAULT 0,
                content BLOB,
                is_downloaded INTEGER NOT NULL DEFAULT 0,
                downloaded_at TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS imap_folders (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                full_path TEXT NOT NULL,
                parent_id TEXT,
                uid_validity INTEGER,
                uid_next INTEGER
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS pop3_uidl (
                account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                uidl TEXT NOT NULL,
                downloaded_at TEXT NOT NULL,
                PRIMARY KEY (account_id, uidl)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_date ON messages(date DESC)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_unread ON messages(is_read)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_folder ON messages(account_id, folder_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // Accounts

    /// Lists accounts, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query("SELECT * FROM accounts ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_account).collect()
    }

    /// Gets an account by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_account(&self, id: &AccountId) -> Result<Option<Account>> {
        let row = sqlx::query("SELECT * FROM accounts WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_account).transpose()
    }

    /// Inserts or updates an account. `created_at` is kept from the first
    /// insert.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or another account
    /// already uses the email.
    pub async fn upsert_account(&self, account: &Account) -> Result<()> {
        let _guard = self.writer.lock().await;
        sqlx::query(
            r"
            INSERT INTO accounts
                (id, email, server_type, imap_host, imap_port, smtp_host, smtp_port,
                 use_tls, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                server_type = excluded.server_type,
                imap_host = excluded.imap_host,
                imap_port = excluded.imap_port,
                smtp_host = excluded.smtp_host,
                smtp_port = excluded.smtp_port,
                use_tls = excluded.use_tls
            ",
        )
        .bind(account.id.as_str())
        .bind(&account.email)
        .bind(account.server_type.as_str())
        .bind(&account.imap_host)
        .bind(i64::from(account.imap_port))
        .bind(&account.smtp_host)
        .bind(i64::from(account.smtp_port))
        .bind(account.use_tls)
        .bind(format_timestamp(account.created_at))
        .execute(&self.pool)
        .await?;

        debug!(account = %account.id, "Account saved");
        Ok(())
    }

    /// Removes an account together with its messages, folders and POP3
    /// bookkeeping.
    ///
    /// Returns false if no such account existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn remove_account(&self, id: &AccountId) -> Result<bool> {
        let _guard = self.writer.lock().await;
        let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // Messages

    /// Lists messages of an account that are not soft-deleted, newest
    /// first, undated messages last.
    ///
    /// `folder_id` of `None` lists every folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_messages(
        &self,
        account_id: &AccountId,
        folder_id: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        let folder_clause = if folder_id.is_some() {
            "AND folder_id = ?"
        } else {
            ""
        };
        let sql = format!(
            "SELECT * FROM messages WHERE account_id = ? AND is_deleted = 0 {folder_clause} \
             ORDER BY date IS NULL, date DESC LIMIT ? OFFSET ?"
        );

        let mut query = sqlx::query(&sql).bind(account_id.as_str());
        if let Some(folder_id) = folder_id {
            query = query.bind(folder_id);
        }
        let rows = query
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_message).collect()
    }

    /// Gets a message by id, including soft-deleted ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_message(&self, id: &str) -> Result<Option<Message>> {
        let row = sqlx::query("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_message).transpose()
    }

    /// Inserts or updates messages in one transaction.
    ///
    /// Updating an existing row refreshes its content but keeps the read,
    /// flagged and deleted flags. A header-only copy (no body, size 0) keeps
    /// the body and size already cached.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the database fails; nothing is
    /// written in that case.
    pub async fn save_messages(&self, messages: &[Message]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let _guard = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;

        for message in messages {
            sqlx::query(
                r"
                INSERT INTO messages
                    (id, account_id, message_id, folder_id, subject, sender, recipients,
                     date, size, headers, body_plain, body_html, is_read, is_flagged,
                     is_deleted, cached_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    account_id = excluded.account_id,
                    message_id = excluded.message_id,
                    folder_id = excluded.folder_id,
                    subject = excluded.subject,
                    sender = excluded.sender,
                    recipients = excluded.recipients,
                    date = excluded.date,
                    size = CASE WHEN excluded.size > 0 THEN excluded.size ELSE messages.size END,
                    headers = excluded.headers,
                    body_plain = COALESCE(excluded.body_plain, messages.body_plain),
                    body_html = COALESCE(excluded.body_html, messages.body_html),
                    cached_at = excluded.cached_at
                ",
            )
            .bind(&message.id)
            .bind(message.account_id.as_str())
            .bind(&message.message_id)
            .bind(&message.folder_id)
            .bind(&message.subject)
            .bind(message.sender.as_ref().map(serde_json::to_string).transpose()?)
            .bind(serde_json::to_string(&message.recipients)?)
            .bind(message.date.map(format_timestamp))
            .bind(to_i64(message.size))
            .bind(serde_json::to_string(&message.headers)?)
            .bind(&message.body_plain)
            .bind(&message.body_html)
            .bind(message.is_read)
            .bind(message.is_flagged)
            .bind(message.is_deleted)
            .bind(format_timestamp(message.cached_at))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(count = messages.len(), "Messages saved");
        Ok(())
    }

    /// Sets the read flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn mark_read(&self, id: &str, is_read: bool) -> Result<()> {
        self.set_flag("is_read", id, is_read).await
    }

    /// Sets the flagged flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn mark_flagged(&self, id: &str, is_flagged: bool) -> Result<()> {
        self.set_flag("is_flagged", id, is_flagged).await
    }

    /// Soft-deletes (or restores) a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn mark_deleted(&self, id: &str, is_deleted: bool) -> Result<()> {
        self.set_flag("is_deleted", id, is_deleted).await
    }

    async fn set_flag(&self, column: &'static str, id: &str, value: bool) -> Result<()> {
        let _guard = self.writer.lock().await;
        sqlx::query(&format!("UPDATE messages SET {column} = ? WHERE id = ?"))
            .bind(value)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Removes a message and its attachments.
    ///
    /// Returns false if no such message existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn delete_message(&self, id: &str) -> Result<bool> {
        let _guard = self.writer.lock().await;
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // Attachments

    /// Lists the attachments of a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_attachments(&self, message_id: &str) -> Result<Vec<Attachment>> {
        let rows = sqlx::query("SELECT * FROM attachments WHERE message_id = ? ORDER BY filename")
            .bind(message_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_attachment).collect())
    }

    /// Inserts or replaces attachments in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn save_attachments(&self, attachments: &[Attachment]) -> Result<()> {
        let _guard = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;

        for attachment in attachments {
            sqlx::query(
                r"
                INSERT OR REPLACE INTO attachments
                    (id, message_id, filename, mime_type, size, content, is_downloaded,
                     downloaded_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(&attachment.id)
            .bind(&attachment.message_id)
            .bind(&attachment.filename)
            .bind(&attachment.mime_type)
            .bind(to_i64(attachment.size))
            .bind(&attachment.data)
            .bind(attachment.is_downloaded())
            .bind(attachment.downloaded_at.map(format_timestamp))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Records or clears an attachment download.
    ///
    /// Marking as downloaded stamps `downloaded_at` (now, if not given).
    /// Clearing drops the content and the timestamp together.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn update_attachment_download_state(
        &self,
        id: &str,
        is_downloaded: bool,
        downloaded_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let _guard = self.writer.lock().await;
        if is_downloaded {
            let at = downloaded_at.unwrap_or_else(Utc::now);
            sqlx::query(
                "UPDATE attachments SET is_downloaded = 1, downloaded_at = ? WHERE id = ?",
            )
            .bind(format_timestamp(at))
            .bind(id)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                r"
                UPDATE attachments
                SET is_downloaded = 0, downloaded_at = NULL, content = NULL
                WHERE id = ?
                ",
            )
            .bind(id)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    // Folders

    /// Lists the folders of an account ordered by full path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_folders(&self, account_id: &AccountId) -> Result<Vec<ImapFolder>> {
        let rows = sqlx::query("SELECT * FROM imap_folders WHERE account_id = ? ORDER BY full_path")
            .bind(account_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_folder).collect())
    }

    /// Inserts or updates folders.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn upsert_folders(&self, folders: &[ImapFolder]) -> Result<()> {
        let _guard = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;

        for folder in folders {
            sqlx::query(
                r"
                INSERT INTO imap_folders
                    (id, account_id, name, full_path, parent_id, uid_validity, uid_next)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    full_path = excluded.full_path,
                    parent_id = excluded.parent_id,
                    uid_validity = excluded.uid_validity,
                    uid_next = excluded.uid_next
                ",
            )
            .bind(&folder.id)
            .bind(folder.account_id.as_str())
            .bind(&folder.name)
            .bind(&folder.full_path)
            .bind(&folder.parent_id)
            .bind(folder.uid_validity.map(i64::from))
            .bind(folder.uid_next.map(i64::from))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Removes every folder of an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn delete_folders(&self, account_id: &AccountId) -> Result<()> {
        let _guard = self.writer.lock().await;
        sqlx::query("DELETE FROM imap_folders WHERE account_id = ?")
            .bind(account_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // POP3 bookkeeping

    /// Returns the UIDLs already downloaded for an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn known_uidls(&self, account_id: &AccountId) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT uidl FROM pop3_uidl WHERE account_id = ?")
            .bind(account_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("uidl")).collect())
    }

    /// Records a downloaded UIDL.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn record_uidl(&self, account_id: &AccountId, uidl: &str) -> Result<()> {
        let _guard = self.writer.lock().await;
        sqlx::query(
            r"
            INSERT INTO pop3_uidl (account_id, uidl, downloaded_at)
            VALUES (?, ?, ?)
            ON CONFLICT(account_id, uidl) DO UPDATE SET downloaded_at = excluded.downloaded_at
            ",
        )
        .bind(account_id.as_str())
        .bind(uidl)
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Fixed-width UTC form, so text order matches time order.
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u32(value: Option<i64>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

fn row_to_account(row: &SqliteRow) -> Result<Account> {
    let server_type: String = row.get("server_type");
    let created_at: String = row.get("created_at");

    Ok(Account {
        id: AccountId(row.get("id")),
        email: row.get("email"),
        server_type: ServerType::from_str(&server_type)?,
        imap_host: row.get("imap_host"),
        imap_port: u16::try_from(row.get::<i64, _>("imap_port")).unwrap_or_default(),
        smtp_host: row.get("smtp_host"),
        smtp_port: u16::try_from(row.get::<i64, _>("smtp_port")).unwrap_or_default(),
        use_tls: row.get("use_tls"),
        created_at: parse_timestamp(&created_at).unwrap_or_else(Utc::now),
    })
}

fn row_to_message(row: &SqliteRow) -> Result<Message> {
    let sender: Option<String> = row.get("sender");
    let recipients: String = row.get("recipients");
    let headers: String = row.get("headers");
    let date: Option<String> = row.get("date");
    let cached_at: String = row.get("cached_at");

    Ok(Message {
        id: row.get("id"),
        account_id: AccountId(row.get("account_id")),
        message_id: row.get("message_id"),
        folder_id: row.get("folder_id"),
        subject: row.get("subject"),
        sender: sender.as_deref().map(serde_json::from_str).transpose()?,
        recipients: serde_json::from_str(&recipients)?,
        date: date.as_deref().and_then(parse_timestamp),
        size: u64::try_from(row.get::<i64, _>("size")).unwrap_or_default(),
        headers: serde_json::from_str(&headers)?,
        body_plain: row.get("body_plain"),
        body_html: row.get("body_html"),
        is_read: row.get("is_read"),
        is_flagged: row.get("is_flagged"),
        is_deleted: row.get("is_deleted"),
        cached_at: parse_timestamp(&cached_at).unwrap_or_else(Utc::now),
    })
}

fn row_to_attachment(row: &SqliteRow) -> Attachment {
    let downloaded_at: Option<String> = row.get("downloaded_at");
    Attachment {
        id: row.get("id"),
        message_id: row.get("message_id"),
        filename: row.get("filename"),
        mime_type: row.get("mime_type"),
        size: u64::try_from(row.get::<i64, _>("size")).unwrap_or_default(),
        data: row.get("content"),
        downloaded_at: downloaded_at.as_deref().and_then(parse_timestamp),
    }
}

fn row_to_folder(row: &SqliteRow) -> ImapFolder {
    ImapFolder {
        id: row.get("id"),
        account_id: AccountId(row.get("account_id")),
        name: row.get("name"),
        full_path: row.get("full_path"),
        parent_id: row.get("parent_id"),
        uid_validity: to_u32(row.get("uid_validity")),
        uid_next: to_u32(row.get("uid_next")),
    }
}
