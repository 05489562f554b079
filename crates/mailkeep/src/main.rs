//! `mailkeep` - command-line front end for the local mail engine
//!
//! Manages accounts, syncs mail into the local cache, tests server settings
//! and sends messages.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;
mod settings;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use mailkeep_core::{
    Account, CacheRepository, CredentialStore, KeyringStore, MailSender, MailSyncService,
    OfflineQueue, SendOutcome, SyncCoordinator, check_incoming, check_outgoing,
};
use mailkeep_mime::{Address, Draft};
use mailkeep_transport::TcpConnector;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Command, NewAccount, USAGE};
use settings::Settings;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailkeep=info,mailkeep_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let command = match Command::parse(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("error: {e:#}\n\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    match run(command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Everything a command needs.
struct App {
    settings: Settings,
    repository: Arc<CacheRepository>,
    credentials: Arc<dyn CredentialStore>,
}

async fn run(command: Command) -> anyhow::Result<()> {
    if command == Command::Help {
        println!("{USAGE}");
        return Ok(());
    }

    let settings = Settings::load(&Settings::default_path()).await?;
    let db_path = settings.database_path();
    let repository = CacheRepository::open(&db_path)
        .await
        .with_context(|| format!("opening cache at {}", db_path.display()))?;
    info!("Cache opened at {}", db_path.display());

    let app = App {
        settings,
        repository: Arc::new(repository),
        credentials: Arc::new(KeyringStore::default()),
    };

    match command {
        Command::Accounts => app.list_accounts().await,
        Command::AddAccount(new) => app.add_account(new).await,
        Command::RemoveAccount(reference) => app.remove_account(&reference).await,
        Command::Sync(reference) => app.sync(reference.as_deref()).await,
        Command::Check(reference) => app.check(&reference).await,
        Command::Send {
            account,
            to,
            subject,
        } => app.send(&account, &to, subject).await,
        Command::Messages { account, limit } => app.list_messages(&account, limit).await,
        Command::Help => Ok(()),
    }
}

impl App {
    /// Finds an account by email (case-insensitive) or id.
    async fn resolve(&self, reference: &str) -> anyhow::Result<Account> {
        self.repository
            .list_accounts()
            .await?
            .into_iter()
            .find(|account| {
                account.id.as_str() == reference || account.email.eq_ignore_ascii_case(reference)
            })
            .ok_or_else(|| anyhow!("no account matches {reference}"))
    }

    async fn list_accounts(&self) -> anyhow::Result<()> {
        let accounts = self.repository.list_accounts().await?;
        if accounts.is_empty() {
            println!("No accounts configured.");
        }
        for account in accounts {
            println!(
                "{}  {}  {} {}:{}  smtp {}:{}{}",
                account.id,
                account.email,
                account.server_type,
                account.imap_host.as_deref().unwrap_or("-"),
                account.imap_port,
                account.smtp_host,
                account.smtp_port,
                if account.use_tls { "" } else { "  (no TLS)" },
            );
        }
        Ok(())
    }

    async fn add_account(&self, new: NewAccount) -> anyhow::Result<()> {
        if self.resolve(&new.email).await.is_ok() {
            bail!("an account for {} already exists", new.email);
        }

        let mut account = Account::new(
            new.email,
            new.server_type,
            new.incoming_host,
            new.smtp_host,
        )
        .with_tls(new.use_tls);
        if let Some(port) = new.incoming_port {
            account = account.with_incoming_port(port);
        }
        if let Some(port) = new.smtp_port {
            account = account.with_smtp_port(port);
        }

        let password = read_password().await?;

        if !new.skip_check {
            let incoming = check_incoming(&TcpConnector, &account, &password).await;
            if !incoming.is_ok() {
                bail!("incoming server: {incoming}");
            }
            let outgoing = check_outgoing(&TcpConnector, &account, &password).await;
            if !outgoing.is_ok() {
                bail!("outgoing server: {outgoing}");
            }
        }

        self.repository.upsert_account(&account).await?;
        if let Err(e) = self.credentials.save(&password, account.id.as_str()) {
            self.repository.remove_account(&account.id).await?;
            return Err(e).context("storing the password");
        }

        println!("Added {} ({})", account.email, account.id);
        Ok(())
    }

    async fn remove_account(&self, reference: &str) -> anyhow::Result<()> {
        let account = self.resolve(reference).await?;
        self.repository.remove_account(&account.id).await?;
        if let Err(e) = self.credentials.delete(account.id.as_str()) {
            warn!(account = %account.id, "Failed to delete stored password: {e}");
        }
        println!("Removed {}", account.email);
        Ok(())
    }

    async fn sync(&self, reference: Option<&str>) -> anyhow::Result<()> {
        let service = MailSyncService::new(
            TcpConnector,
            self.repository.clone(),
            self.credentials.clone(),
        )
        .with_options(self.settings.sync_options());
        let coordinator = SyncCoordinator::new(service);

        if let Some(reference) = reference {
            let account = self.resolve(reference).await?;
            let count = coordinator
                .sync_account(&account.id)
                .await
                .with_context(|| format!("syncing {}", account.email))?;
            println!("{}: {count} message(s)", account.email);
            return Ok(());
        }

        let reports = coordinator.sync_all().await?;
        let mut failures = 0;
        for report in &reports {
            match &report.result {
                Ok(count) => println!("{}: {count} message(s)", report.email),
                Err(e) => {
                    failures += 1;
                    println!("{}: failed ({}): {e}", report.email, e.kind());
                }
            }
        }
        if failures > 0 {
            bail!("{failures} of {} account(s) failed to sync", reports.len());
        }
        Ok(())
    }

    async fn check(&self, reference: &str) -> anyhow::Result<()> {
        let account = self.resolve(reference).await?;
        let password = self
            .credentials
            .retrieve(account.id.as_str())
            .context("reading the stored password")?;

        let incoming = check_incoming(&TcpConnector, &account, &password).await;
        let outgoing = check_outgoing(&TcpConnector, &account, &password).await;
        println!("incoming: {incoming}");
        println!("outgoing: {outgoing}");

        if incoming.is_ok() && outgoing.is_ok() {
            Ok(())
        } else {
            bail!("connection check failed for {}", account.email)
        }
    }

    async fn send(&self, reference: &str, to: &str, subject: String) -> anyhow::Result<()> {
        let account = self.resolve(reference).await?;
        let recipient =
            Address::parse(to).ok_or_else(|| anyhow!("invalid recipient address: {to}"))?;

        let mut body = String::new();
        tokio::io::stdin()
            .read_to_string(&mut body)
            .await
            .context("reading the message body")?;

        let draft = Draft::new(Address::new(account.email.clone()))
            .to(recipient)
            .subject(subject)
            .body(body);

        let sender = MailSender::new(
            TcpConnector,
            self.repository.clone(),
            self.credentials.clone(),
            Arc::new(OfflineQueue::new()),
        )
        .with_retry(self.settings.retry_policy());

        match sender.send(&account, &draft).await? {
            SendOutcome::Sent => {
                println!("Sent.");
                Ok(())
            }
            SendOutcome::Queued(_) => {
                bail!("server unreachable; the message was not delivered")
            }
        }
    }

    async fn list_messages(&self, reference: &str, limit: u32) -> anyhow::Result<()> {
        let account = self.resolve(reference).await?;
        let messages = self
            .repository
            .list_messages(&account.id, None, limit, 0)
            .await?;

        if messages.is_empty() {
            println!("No cached messages for {}.", account.email);
        }
        for message in messages {
            println!(
                "{} {:<16} {:<30} {}",
                if message.is_read { ' ' } else { '*' },
                message
                    .date
                    .map_or_else(|| "-".to_string(), |d| d.format("%Y-%m-%d %H:%M").to_string()),
                message
                    .sender
                    .as_ref()
                    .map_or("(unknown)", Address::display_name),
                message.subject.as_deref().unwrap_or("(no subject)"),
            );
        }
        Ok(())
    }
}

/// Reads the first line of stdin as the account password.
async fn read_password() -> anyhow::Result<String> {
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("reading the password from stdin")?;

    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("no password given on stdin");
    }
    Ok(password)
}
