//! Accounts and their secrets.

pub mod credentials;
mod model;

pub use credentials::{
    CredentialError, CredentialResult, CredentialStore, KeyringStore, MemoryStore,
};
pub use model::{
    Account, AccountId, DEFAULT_IMAP_PORT, DEFAULT_POP3_PORT, DEFAULT_SMTP_PORT, IncomingServer,
    ServerType,
};
