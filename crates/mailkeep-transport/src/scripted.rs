//! Scripted connections for tests.
//!
//! Each call to [`Connector::connect`] hands out the next queued
//! [`tokio_test::io::Mock`], which asserts the exact bytes written and plays
//! back the server's replies.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio_test::io::Mock;

use crate::config::ServerConfig;
use crate::connector::Connector;
use crate::transport::Transport;
use crate::{Error, Result};

enum Script {
    Stream(Mock),
    Refuse,
}

/// Connector that replays queued in-memory conversations.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    connects: Arc<AtomicUsize>,
    upgrades: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    /// Creates a connector with no queued conversations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a conversation for the next connect.
    #[must_use]
    pub fn with(self, mock: Mock) -> Self {
        self.push(Script::Stream(mock));
        self
    }

    /// Queues a refused connection for the next connect.
    #[must_use]
    pub fn refusing(self) -> Self {
        self.push(Script::Refuse);
        self
    }

    /// Number of connect attempts made so far.
    #[must_use]
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of STARTTLS upgrades performed so far.
    #[must_use]
    pub fn upgrades(&self) -> usize {
        self.upgrades.load(Ordering::SeqCst)
    }

    fn push(&self, script: Script) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(script);
    }

    fn pop(&self) -> Option<Script> {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

impl std::fmt::Debug for ScriptedConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedConnector")
            .field("connects", &self.connects())
            .field("upgrades", &self.upgrades())
            .finish_non_exhaustive()
    }
}

impl Connector for ScriptedConnector {
    type Stream = Mock;

    async fn connect(&self, config: &ServerConfig) -> Result<Transport<Mock>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match self.pop() {
            Some(Script::Stream(mock)) => Ok(Transport::with_io_timeout(mock, config.io_timeout)),
            Some(Script::Refuse) | None => Err(Error::Connect {
                host: config.host.clone(),
                port: config.port,
                source: std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "no scripted conversation",
                ),
            }),
        }
    }

    async fn upgrade(&self, transport: Transport<Mock>, _host: &str) -> Result<Transport<Mock>> {
        self.upgrades.fetch_add(1, Ordering::SeqCst);
        Ok(transport)
    }
}
