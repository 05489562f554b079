//! Services that talk to mail servers on behalf of cached accounts.

pub mod check;
pub mod coordinator;
pub mod outbox;
pub mod retry;
pub mod send;
pub mod sync;

pub use check::{CheckOutcome, check_incoming, check_outgoing};
pub use coordinator::{AccountSyncReport, SyncCoordinator};
pub use outbox::{OfflineQueue, QueuedMessage};
pub use retry::{RetryPolicy, retry};
pub use send::{FlushReport, MailSender, SendOutcome};
pub use sync::{MailSyncService, SyncOptions};
