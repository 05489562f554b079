//! # mailkeep-pop3
//!
//! POP3 client implementing RFC 1939: USER/PASS, STAT, LIST, UIDL, RETR,
//! DELE, RSET, NOOP and QUIT.
//!
//! Replies are reassembled from however many reads the network needs and
//! checked after every chunk: single-line replies end at the first line
//! break, multi-line replies at the lone `.` line, which is stripped along
//! with byte-stuffing. Reassembly is bounded by [`ResponseLimits`] (1,000,000
//! bytes and 100 reads by default); exceeding either is an error, never a
//! silent truncation.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailkeep_pop3::Pop3Client;
//! use mailkeep_transport::ServerConfig;
//!
//! let mut client = Pop3Client::new(ServerConfig::incoming("pop.example.com", 995, true));
//! client.connect().await?;
//! client.login("user@example.com", "password").await?;
//!
//! let stat = client.stat().await?;
//! for number in 1..=stat.count {
//!     let raw = client.retrieve(number).await?;
//!     println!("message {number}: {} bytes", raw.len());
//! }
//!
//! client.disconnect().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod client;
pub mod error;
pub mod response;

pub use client::{Pop3Client, State};
pub use error::{Error, Result};
pub use response::{MailboxStat, MessageInfo, Reply, ResponseLimits, UidlEntry};
