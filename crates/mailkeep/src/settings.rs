//! Settings that persist across runs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use mailkeep_core::{RetryPolicy, SyncOptions};
use serde::{Deserialize, Serialize};

const APP_DIR: &str = "mailkeep";

/// Application settings, read from `settings.json` in the config directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Cache database location; the data directory when unset.
    pub database_path: Option<PathBuf>,
    /// Most recent messages fetched per folder on each sync.
    pub messages_per_folder: u32,
    /// Connection attempts before a server counts as unreachable.
    pub retry_attempts: u32,
    /// Delay before the second attempt, in seconds.
    pub retry_delay_secs: u64,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Read/write timeout in seconds.
    pub io_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: None,
            messages_per_folder: 50,
            retry_attempts: 3,
            retry_delay_secs: 1,
            connect_timeout_secs: 30,
            io_timeout_secs: 60,
        }
    }
}

impl Settings {
    /// Default location of `settings.json`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("settings.json")
    }

    /// Loads settings, falling back to defaults when the file does not exist.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(Self::default());
        }

        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    /// Where the cache database lives.
    pub fn database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("mailkeep.db")
        })
    }

    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            initial_delay: Duration::from_secs(self.retry_delay_secs),
            multiplier: 2.0,
        }
    }

    pub const fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            messages_per_folder: self.messages_per_folder,
            retry: self.retry_policy(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            io_timeout: Duration::from_secs(self.io_timeout_secs),
        }
    }
}
