//! Local mail cache.
//!
//! Keeps accounts, messages, attachments and folder state in `SQLite` so
//! mail stays readable while servers are unreachable.

mod model;
mod repository;

pub use model::{Attachment, ImapFolder, Message};
pub use repository::CacheRepository;
