//! # mailkeep-imap
//!
//! IMAP client covering the subset of RFC 3501 a caching mail engine needs:
//! greeting, LOGIN, LIST, SELECT, `FETCH (BODY.PEEK[HEADER])` and LOGOUT.
//!
//! ## Features
//!
//! - **Tagged completion**: responses are read line by line until the line
//!   starting with the command's tag, skipping over literals so that message
//!   content can never end a response early
//! - **Exclusive access**: every command takes `&mut self`; there is no
//!   pipelining
//! - **Cancellation-safe state**: a dropped command future leaves the client
//!   disconnected rather than half-authenticated
//! - **Credential redaction**: passwords never reach the logs
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailkeep_imap::ImapClient;
//! use mailkeep_transport::ServerConfig;
//!
//! let mut client = ImapClient::new(ServerConfig::incoming("imap.example.com", 993, true));
//! client.connect().await?;
//! client.login("user@example.com", "password").await?;
//!
//! for folder in client.list_folders().await? {
//!     let status = client.select_folder(&folder).await?;
//!     if status.message_count > 0 {
//!         let headers = client.fetch_headers(1..=status.message_count).await?;
//!         println!("{folder}: {} header blocks", headers.len());
//!     }
//! }
//!
//! client.disconnect().await;
//! ```
//!
//! ## Connection States
//!
//! ```text
//! Disconnected ── connect() ──→ Connected ── login() ──→ Authenticated
//!                                                            │
//!                                        select_folder() ───→ Selected
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod client;
pub mod error;
pub mod response;
pub mod tag;

pub use client::{ImapClient, State};
pub use error::{Error, Result};
pub use response::{FolderStatus, MailboxEntry, Status, TaggedResponse};
pub use tag::TagGenerator;
