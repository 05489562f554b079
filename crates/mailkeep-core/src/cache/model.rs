//! Cached mail data.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use mailkeep_mime::{Address, ParsedMessage};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AccountId;

/// A message stored in the local cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Cache key. Equals the `Message-ID` header when the message has one,
    /// so re-syncing the same message updates the existing row.
    pub id: String,
    /// Owning account.
    pub account_id: AccountId,
    /// `Message-ID` header.
    pub message_id: Option<String>,
    /// Folder, or `None` for POP3 mail.
    pub folder_id: Option<String>,
    /// Subject line.
    pub subject: Option<String>,
    /// Sender.
    pub sender: Option<Address>,
    /// `To` followed by `Cc`.
    pub recipients: Vec<Address>,
    /// Sent date, when it could be parsed.
    pub date: Option<DateTime<Utc>>,
    /// Size in bytes, 0 when unknown.
    pub size: u64,
    /// All headers after unfolding.
    pub headers: BTreeMap<String, String>,
    /// Plain text body.
    pub body_plain: Option<String>,
    /// HTML body.
    pub body_html: Option<String>,
    /// Read flag.
    pub is_read: bool,
    /// Flagged/starred.
    pub is_flagged: bool,
    /// Soft-deleted.
    pub is_deleted: bool,
    /// When the row was written.
    pub cached_at: DateTime<Utc>,
}

impl Message {
    /// Builds a cache entry from parser output.
    ///
    /// `fallback_id` supplies the id when the message has no `Message-ID`.
    #[must_use]
    pub fn from_parsed(
        parsed: ParsedMessage,
        account_id: AccountId,
        folder_id: Option<String>,
        fallback_id: impl FnOnce() -> String,
        size: u64,
    ) -> Self {
        let id = parsed.message_id.clone().unwrap_or_else(fallback_id);
        let recipients = parsed.to.into_iter().chain(parsed.cc).collect();

        Self {
            id,
            account_id,
            message_id: parsed.message_id,
            folder_id,
            subject: parsed.subject,
            sender: parsed.from,
            recipients,
            date: parsed.date,
            size,
            headers: parsed.headers.to_map(),
            body_plain: parsed.body_plain,
            body_html: parsed.body_html,
            is_read: false,
            is_flagged: false,
            is_deleted: false,
            cached_at: Utc::now(),
        }
    }

    /// Returns the body to display: HTML when present and non-empty,
    /// otherwise plain text.
    #[must_use]
    pub fn preferred_body(&self) -> Option<&str> {
        self.body_html
            .as_deref()
            .filter(|html| !html.trim().is_empty())
            .or(self.body_plain.as_deref())
    }
}

/// An IMAP mailbox as last seen by sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImapFolder {
    /// `{account id}-{full path}`.
    pub id: String,
    /// Owning account.
    pub account_id: AccountId,
    /// Last path component.
    pub name: String,
    /// Server-canonical name, used as the SELECT argument.
    pub full_path: String,
    /// Parent folder id.
    pub parent_id: Option<String>,
    /// UID epoch. When it changes, cached UID mappings for the folder are
    /// no longer valid.
    pub uid_validity: Option<u32>,
    /// Next UID the server will assign.
    pub uid_next: Option<u32>,
}

impl ImapFolder {
    /// Folder id for a mailbox of an account.
    #[must_use]
    pub fn folder_id(account_id: &AccountId, full_path: &str) -> String {
        format!("{account_id}-{full_path}")
    }

    /// Returns true if both snapshots know UIDVALIDITY and the values differ.
    #[must_use]
    pub fn uid_validity_changed(&self, previous: &Self) -> bool {
        matches!(
            (self.uid_validity, previous.uid_validity),
            (Some(current), Some(before)) if current != before
        )
    }
}

/// An attachment of a cached message.
///
/// The content may be absent until downloaded. Whether it counts as
/// downloaded is derived from `data` and `downloaded_at`, so the two can
/// never disagree with a separate flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Attachment id.
    pub id: String,
    /// Owning message id.
    pub message_id: String,
    /// File name.
    pub filename: String,
    /// MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Content, once downloaded.
    pub data: Option<Vec<u8>>,
    /// When the content was downloaded.
    pub downloaded_at: Option<DateTime<Utc>>,
}

impl Attachment {
    /// Creates an attachment that has not been downloaded.
    #[must_use]
    pub fn new(
        message_id: impl Into<String>,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message_id: message_id.into(),
            filename: filename.into(),
            mime_type: mime_type.into(),
            size,
            data: None,
            downloaded_at: None,
        }
    }

    /// Returns true once content is present or a download was recorded.
    #[must_use]
    pub const fn is_downloaded(&self) -> bool {
        self.data.is_some() || self.downloaded_at.is_some()
    }

    /// Stores downloaded content.
    pub fn mark_downloaded(&mut self, data: Vec<u8>, at: DateTime<Utc>) {
        self.size = data.len() as u64;
        self.data = Some(data);
        self.downloaded_at = Some(at);
    }

    /// Drops downloaded content.
    pub fn clear_download(&mut self) {
        self.data = None;
        self.downloaded_at = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone)]
mod tests {
    use super::*;

    const RAW: &str = concat!(
        "Message-ID: <1@example.com>\r\n",
        "From: Alice <alice@example.com>\r\n",
        "To: bob@example.com\r\n",
        "Cc: carol@example.com\r\n",
        "Subject: Hi\r\n",
        "\r\n",
        "Hello"
    );

    #[test]
    fn test_from_parsed_uses_message_id() {
        let parsed = mailkeep_mime::parse(RAW).unwrap();
        let message = Message::from_parsed(
            parsed,
            AccountId::from("acct"),
            Some("acct-INBOX".to_string()),
            || "fallback".to_string(),
            0,
        );
        assert_eq!(message.id, "<1@example.com>");
        assert_eq!(message.recipients.len(), 2);
        assert_eq!(message.recipients[1].email, "carol@example.com");
        assert_eq!(message.headers.get("Subject").map(String::as_str), Some("Hi"));
        assert!(!message.is_read);
    }

    #[test]
    fn test_from_parsed_fallback_id() {
        let parsed = mailkeep_mime::parse("Subject: none\r\n\r\nbody").unwrap();
        let message = Message::from_parsed(parsed, AccountId::from("acct"), None, || "fallback".to_string(), 12);
        assert_eq!(message.id, "fallback");
        assert_eq!(message.message_id, None);
        assert_eq!(message.size, 12);
    }

    #[test]
    fn test_preferred_body() {
        let parsed = mailkeep_mime::parse("Subject: x\r\n\r\nplain").unwrap();
        let mut message = Message::from_parsed(parsed, AccountId::from("a"), None, String::new, 0);
        assert_eq!(message.preferred_body(), Some("plain"));
        message.body_html = Some("  ".to_string());
        assert_eq!(message.preferred_body(), Some("plain"));
        message.body_html = Some("<p>x</p>".to_string());
        assert_eq!(message.preferred_body(), Some("<p>x</p>"));
    }

    #[test]
    fn test_uid_validity_changed() {
        let folder = ImapFolder {
            id: "a-INBOX".to_string(),
            account_id: AccountId::from("a"),
            name: "INBOX".to_string(),
            full_path: "INBOX".to_string(),
            parent_id: None,
            uid_validity: Some(1),
            uid_next: Some(10),
        };
        let mut later = folder.clone();
        assert!(!later.uid_validity_changed(&folder));
        later.uid_validity = Some(2);
        assert!(later.uid_validity_changed(&folder));
        later.uid_validity = None;
        assert!(!later.uid_validity_changed(&folder));
    }

    #[test]
    fn test_attachment_download_state() {
        let mut attachment = Attachment::new("m1", "a.txt", "text/plain", 0);
        assert!(!attachment.is_downloaded());
        attachment.mark_downloaded(b"abc".to_vec(), Utc::now());
        assert!(attachment.is_downloaded());
        assert_eq!(attachment.size, 3);
        attachment.clear_download();
        assert!(!attachment.is_downloaded());
    }
}
