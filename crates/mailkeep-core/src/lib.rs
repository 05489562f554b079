//! # mailkeep-core
//!
//! Accounts, the local cache and the services that fill and use it.
//!
//! This crate provides:
//! - Account model and secret storage (system keyring or in-memory)
//! - Local storage (`SQLite`) for messages, attachments and folders
//! - IMAP and POP3 sync into the cache, per account or all at once
//! - Sending with an offline queue for unreachable servers
//! - Connection tests for account setup
//! - Retry with exponential backoff
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use mailkeep_core::{CacheRepository, KeyringStore, MailSyncService, SyncCoordinator};
//! use mailkeep_transport::TcpConnector;
//!
//! let repository = Arc::new(CacheRepository::open("mailkeep.db").await?);
//! let service = MailSyncService::new(TcpConnector, repository, Arc::new(KeyringStore::default()));
//! for report in SyncCoordinator::new(service).sync_all().await? {
//!     println!("{}: {} messages", report.email, report.synced());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
pub mod cache;
mod error;
pub mod service;

pub use account::credentials;
pub use account::{
    Account, AccountId, CredentialError, CredentialResult, CredentialStore, IncomingServer,
    KeyringStore, MemoryStore, ServerType,
};
pub use cache::{Attachment, CacheRepository, ImapFolder, Message};
pub use error::{Error, ErrorKind, Result};
pub use service::{
    AccountSyncReport, CheckOutcome, FlushReport, MailSender, MailSyncService, OfflineQueue,
    QueuedMessage, RetryPolicy, SendOutcome, SyncCoordinator, SyncOptions, check_incoming,
    check_outgoing, retry,
};
