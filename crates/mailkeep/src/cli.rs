//! Command-line parsing.

use anyhow::{Context, anyhow, bail};
use mailkeep_core::ServerType;

pub const USAGE: &str = "\
Usage: mailkeep <command> [args]

Commands:
  accounts                                  List configured accounts
  add-account <email> <imap|pop3> <incoming-host> <smtp-host>
              [--incoming-port N] [--smtp-port N] [--no-tls] [--skip-check]
                                            Add an account; the password is read from stdin
  remove-account <account>                  Remove an account and its cached mail
  sync [account]                            Sync one account, or all of them
  check <account>                           Test the incoming and outgoing servers
  send <account> <to> <subject>             Send a message; the body is read from stdin
  messages <account> [limit]                List cached messages, newest first

<account> is an account email or id.";

/// Options for `add-account`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub email: String,
    pub server_type: ServerType,
    pub incoming_host: String,
    pub smtp_host: String,
    pub incoming_port: Option<u16>,
    pub smtp_port: Option<u16>,
    pub use_tls: bool,
    pub skip_check: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Accounts,
    AddAccount(NewAccount),
    RemoveAccount(String),
    Sync(Option<String>),
    Check(String),
    Send {
        account: String,
        to: String,
        subject: String,
    },
    Messages {
        account: String,
        limit: u32,
    },
    Help,
}

impl Command {
    /// Parses the arguments that follow the program name.
    pub fn parse<I, S>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args: Vec<String> = args.into_iter().map(Into::into).collect();
        if args.is_empty() {
            return Ok(Self::Help);
        }
        let command = args.remove(0);

        match command.as_str() {
            "accounts" => {
                expect_count(&command, &args, 0)?;
                Ok(Self::Accounts)
            }
            "add-account" => parse_new_account(args).map(Self::AddAccount),
            "remove-account" => {
                expect_count(&command, &args, 1)?;
                Ok(Self::RemoveAccount(args.remove(0)))
            }
            "sync" => match args.len() {
                0 => Ok(Self::Sync(None)),
                1 => Ok(Self::Sync(Some(args.remove(0)))),
                _ => bail!("sync takes at most one account"),
            },
            "check" => {
                expect_count(&command, &args, 1)?;
                Ok(Self::Check(args.remove(0)))
            }
            "send" => {
                expect_count(&command, &args, 3)?;
                let mut args = args.into_iter();
                Ok(Self::Send {
                    account: args.next().unwrap_or_default(),
                    to: args.next().unwrap_or_default(),
                    subject: args.next().unwrap_or_default(),
                })
            }
            "messages" => {
                let limit = match args.len() {
                    1 => 20,
                    2 => args[1]
                        .parse()
                        .with_context(|| format!("invalid limit: {}", args[1]))?,
                    _ => bail!("messages takes an account and an optional limit"),
                };
                Ok(Self::Messages {
                    account: args.remove(0),
                    limit,
                })
            }
            "help" | "-h" | "--help" => Ok(Self::Help),
            other => Err(anyhow!("unknown command: {other}")),
        }
    }
}

fn expect_count(command: &str, args: &[String], count: usize) -> anyhow::Result<()> {
    if args.len() != count {
        bail!(
            "{command} takes {count} argument(s), got {}",
            args.len()
        );
    }
    Ok(())
}

fn parse_new_account(args: Vec<String>) -> anyhow::Result<NewAccount> {
    let mut positional = Vec::new();
    let mut incoming_port = None;
    let mut smtp_port = None;
    let mut use_tls = true;
    let mut skip_check = false;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--incoming-port" => incoming_port = Some(parse_port(&arg, args.next())?),
            "--smtp-port" => smtp_port = Some(parse_port(&arg, args.next())?),
            "--no-tls" => use_tls = false,
            "--skip-check" => skip_check = true,
            flag if flag.starts_with("--") => bail!("unknown option: {flag}"),
            _ => positional.push(arg),
        }
    }

    let [email, server_type, incoming_host, smtp_host]: [String; 4] = positional
        .try_into()
        .map_err(|_| anyhow!("add-account needs <email> <imap|pop3> <incoming-host> <smtp-host>"))?;

    Ok(NewAccount {
        email,
        server_type: server_type.parse()?,
        incoming_host,
        smtp_host,
        incoming_port,
        smtp_port,
        use_tls,
        skip_check,
    })
}

fn parse_port(flag: &str, value: Option<String>) -> anyhow::Result<u16> {
    let value = value.ok_or_else(|| anyhow!("{flag} needs a value"))?;
    value
        .parse()
        .with_context(|| format!("invalid port for {flag}: {value}"))
}
