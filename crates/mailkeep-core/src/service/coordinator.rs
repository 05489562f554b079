//! Runs account syncs side by side.

use std::sync::Arc;

use mailkeep_transport::{Connector, TcpConnector};
use tokio::task::JoinSet;
use tracing::{error, info};

use super::sync::MailSyncService;
use crate::account::AccountId;
use crate::{Error, Result};

/// Outcome of syncing one account.
#[derive(Debug)]
pub struct AccountSyncReport {
    /// The account.
    pub account_id: AccountId,
    /// Its email address.
    pub email: String,
    /// Messages stored, or why the pass was aborted.
    pub result: Result<usize>,
}

impl AccountSyncReport {
    /// Messages stored, 0 if the pass failed.
    #[must_use]
    pub fn synced(&self) -> usize {
        self.result.as_ref().map_or(0, |count| *count)
    }
}

/// Syncs every cached account, each in its own task.
///
/// A failing account never affects the others.
pub struct SyncCoordinator<C: Connector + Clone = TcpConnector> {
    service: Arc<MailSyncService<C>>,
}

impl<C: Connector + Clone + 'static> SyncCoordinator<C> {
    /// Creates a coordinator around a sync service.
    #[must_use]
    pub fn new(service: MailSyncService<C>) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    /// Returns the sync service.
    #[must_use]
    pub fn service(&self) -> &MailSyncService<C> {
        &self.service
    }

    /// Syncs one cached account.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` for an unknown id, or the sync error.
    pub async fn sync_account(&self, id: &AccountId) -> Result<usize> {
        let account = self
            .service
            .repository()
            .get_account(id)
            .await?
            .ok_or_else(|| Error::AccountNotFound(id.to_string()))?;
        self.service.sync(&account).await
    }

    /// Syncs all cached accounts concurrently.
    ///
    /// Reports come back in account order.
    ///
    /// # Errors
    ///
    /// Returns an error only if the account list cannot be read.
    pub async fn sync_all(&self) -> Result<Vec<AccountSyncReport>> {
        let accounts = self.service.repository().list_accounts().await?;
        let mut tasks = JoinSet::new();

        for (index, account) in accounts.into_iter().enumerate() {
            let service = Arc::clone(&self.service);
            tasks.spawn(async move {
                let result = service.sync(&account).await;
                if let Err(e) = &result {
                    error!(account = %account.id, kind = %e.kind(), "Sync aborted: {e}");
                }
                let report = AccountSyncReport {
                    account_id: account.id,
                    email: account.email,
                    result,
                };
                (index, report)
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(entry) => reports.push(entry),
                Err(e) => error!("Sync task failed: {e}"),
            }
        }
        reports.sort_by_key(|(index, _)| *index);

        let total: usize = reports.iter().map(|(_, report)| report.synced()).sum();
        info!(accounts = reports.len(), total, "All accounts synced");
        Ok(reports.into_iter().map(|(_, report)| report).collect())
    }
}
