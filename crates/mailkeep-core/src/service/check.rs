//! Connection tests for account setup.

use std::fmt;

use mailkeep_imap::ImapClient;
use mailkeep_pop3::Pop3Client;
use mailkeep_smtp::SmtpClient;
use mailkeep_transport::{Connector, ServerConfig};
use tracing::info;

use crate::account::{Account, IncomingServer};
use crate::error::{Error, ErrorKind, Result};

/// Outcome of a connection test, worded for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Connected and logged in.
    Ok,
    /// The server did not answer in time.
    Timeout,
    /// The server rejected the email or password.
    AuthenticationFailed,
    /// Any other failure, with details.
    ConnectionFailed(String),
}

impl CheckOutcome {
    /// Classifies an error.
    #[must_use]
    pub fn from_error(error: &Error) -> Self {
        match error.kind() {
            ErrorKind::Timeout => Self::Timeout,
            ErrorKind::AuthenticationFailed => Self::AuthenticationFailed,
            _ => Self::ConnectionFailed(error.to_string()),
        }
    }

    /// Returns true if the test passed.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Human-readable explanation.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Ok => "Connection successful".to_string(),
            Self::Timeout => {
                "Connection timed out. Check the server address and port.".to_string()
            }
            Self::AuthenticationFailed => {
                "Authentication failed. Check your email address and password.".to_string()
            }
            Self::ConnectionFailed(detail) => format!("Could not connect: {detail}"),
        }
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

impl<T> From<Result<T>> for CheckOutcome {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(e) => Self::from_error(&e),
        }
    }
}

/// Connects to the account's incoming server and logs in.
///
/// The password is passed in so an account can be tested before its
/// credentials are stored.
pub async fn check_incoming<C: Connector + Clone>(
    connector: &C,
    account: &Account,
    password: &str,
) -> CheckOutcome {
    let outcome = match account.incoming() {
        Ok(IncomingServer::Imap(config)) => {
            check_imap(config, connector.clone(), &account.email, password).await
        }
        Ok(IncomingServer::Pop3(config)) => {
            check_pop3(config, connector.clone(), &account.email, password).await
        }
        Err(e) => Err(e),
    };
    let outcome = CheckOutcome::from(outcome);
    info!(account = %account.email, %outcome, "Incoming server checked");
    outcome
}

/// Connects to the account's SMTP server, greets it and logs in.
pub async fn check_outgoing<C: Connector + Clone>(
    connector: &C,
    account: &Account,
    password: &str,
) -> CheckOutcome {
    let mut client = SmtpClient::with_connector(account.outgoing(), connector.clone());
    let result = async {
        client.connect().await?;
        client.handshake(account.domain()).await?;
        client.login(&account.email, password).await
    }
    .await;
    client.disconnect().await;

    let outcome = CheckOutcome::from(result.map_err(Error::from));
    info!(account = %account.email, %outcome, "Outgoing server checked");
    outcome
}

async fn check_imap<C: Connector>(
    config: ServerConfig,
    connector: C,
    username: &str,
    password: &str,
) -> Result<()> {
    let mut client = ImapClient::with_connector(config, connector);
    let result = match client.connect().await {
        Ok(()) => client.login(username, password).await,
        Err(e) => Err(e),
    };
    client.disconnect().await;
    Ok(result?)
}

async fn check_pop3<C: Connector>(
    config: ServerConfig,
    connector: C,
    username: &str,
    password: &str,
) -> Result<()> {
    let mut client = Pop3Client::with_connector(config, connector);
    let result = match client.connect().await {
        Ok(()) => client.login(username, password).await,
        Err(e) => Err(e),
    };
    client.disconnect().await;
    Ok(result?)
}
