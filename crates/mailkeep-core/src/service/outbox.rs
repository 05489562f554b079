//! Offline queue of composed messages waiting to be sent.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::AccountId;

/// A composed message that could not be delivered yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMessage {
    /// Queue entry id.
    pub id: String,
    /// Sending account.
    pub account_id: AccountId,
    /// Envelope sender.
    pub from: String,
    /// Envelope recipients (To, Cc and Bcc).
    pub recipients: Vec<String>,
    /// Complete RFC 5322 text.
    pub raw: String,
    /// When the message was first queued.
    pub queued_at: DateTime<Utc>,
    /// Failed delivery attempts so far.
    pub attempts: u32,
}

impl QueuedMessage {
    /// Creates a queue entry.
    #[must_use]
    pub fn new(
        account_id: AccountId,
        from: impl Into<String>,
        recipients: Vec<String>,
        raw: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            account_id,
            from: from.into(),
            recipients,
            raw: raw.into(),
            queued_at: Utc::now(),
            attempts: 0,
        }
    }
}

/// First-in, first-out queue shared by everything that sends mail.
///
/// Every operation takes one short exclusive lock, so the queue can be
/// shared behind an `Arc` between tasks.
#[derive(Debug, Default)]
pub struct OfflineQueue {
    entries: Mutex<VecDeque<QueuedMessage>>,
    notify: Notify,
}

impl OfflineQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut VecDeque<QueuedMessage>) -> T) -> T {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut entries)
    }

    /// Appends a message at the back.
    pub fn enqueue(&self, message: QueuedMessage) {
        self.with_entries(|entries| entries.push_back(message));
        self.notify.notify_one();
    }

    /// Puts a message back at the front, ahead of everything queued later.
    pub fn requeue_front(&self, message: QueuedMessage) {
        self.with_entries(|entries| entries.push_front(message));
        self.notify.notify_one();
    }

    /// Removes the oldest message, if any.
    pub fn dequeue(&self) -> Option<QueuedMessage> {
        self.with_entries(VecDeque::pop_front)
    }

    /// Waits until a message is available and removes it.
    pub async fn next(&self) -> QueuedMessage {
        loop {
            let notified = self.notify.notified();
            if let Some(message) = self.dequeue() {
                return message;
            }
            notified.await;
        }
    }

    /// Copies the queue contents, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<QueuedMessage> {
        self.with_entries(|entries| entries.iter().cloned().collect())
    }

    /// Number of queued messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.with_entries(|entries| entries.len())
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
