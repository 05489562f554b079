//! # mailkeep-mime
//!
//! Bridges raw message text and structured data: an RFC 822/2822 parser for
//! what the protocol clients download and an RFC 5322 composer for what the
//! SMTP client sends.
//!
//! ## Features
//!
//! - **Parsing**: header unfolding, case-insensitive last-value-wins header
//!   lookup, address lists, RFC 2822 dates, plain/HTML body classification
//! - **Composition**: fixed header order, `"Name" <email>` formatting,
//!   whole-subject RFC 2047 encoding, Message-ID generation
//! - **Single-part only**: bodies are returned and written verbatim; there is
//!   no multipart decomposition
//!
//! ## Quick Start
//!
//! ### Parsing
//!
//! ```ignore
//! use mailkeep_mime::parse;
//!
//! let message = parse("From: alice@example.com\r\nSubject: Hi\r\n\r\nHello!")?;
//! println!("{}", message.subject.as_deref().unwrap_or("(no subject)"));
//! ```
//!
//! ### Composing
//!
//! ```ignore
//! use mailkeep_mime::{Address, Draft};
//!
//! let raw = Draft::new(Address::with_name("Alice", "alice@example.com"))
//!     .to(Address::new("bob@example.com"))
//!     .subject("Grüße")
//!     .body("Hello Bob")
//!     .compose()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod composer;
mod error;
mod headers;
mod parser;

pub mod encoding;

pub use address::Address;
pub use composer::{Draft, generate_message_id};
pub use error::{Error, Result};
pub use headers::Headers;
pub use parser::{ParsedMessage, RFC2822_DATE_FORMAT, parse, parse_date};
