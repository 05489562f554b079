//! End-to-end sync through scripted servers.

#![allow(clippy::unwrap_used, clippy::redundant_clone)]

use std::sync::Arc;
use std::time::Duration;

use mailkeep_core::{
    Account, CacheRepository, CredentialStore, Error, ErrorKind, MailSyncService, MemoryStore,
    RetryPolicy, ServerType, SyncCoordinator, SyncOptions,
};
use mailkeep_transport::ScriptedConnector;
use tokio_test::io::{Builder, Mock};

const INBOX_HEADER: &str = concat!(
    "Message-ID: <b1@example.com>\r\n",
    "From: Bob <bob@example.com>\r\n",
    "To: alice@example.com\r\n",
    "Subject: Hello\r\n",
    "Date: Tue, 05 Mar 2024 14:30:00 +0100\r\n",
    "\r\n"
);

fn imap_account() -> Account {
    Account::new("alice@example.com", ServerType::Imap, "imap.example.com", "smtp.example.com")
}

fn pop3_account() -> Account {
    Account::new("bob@example.com", ServerType::Pop3, "pop.example.com", "smtp.example.com")
}

struct Fixture {
    repository: Arc<CacheRepository>,
    credentials: Arc<MemoryStore>,
}

impl Fixture {
    async fn new(accounts: &[&Account]) -> Self {
        let repository = Arc::new(CacheRepository::in_memory().await.unwrap());
        let credentials = Arc::new(MemoryStore::new());
        for account in accounts {
            repository.upsert_account(account).await.unwrap();
            credentials.save("secret", account.id.as_str()).unwrap();
        }
        Self {
            repository,
            credentials,
        }
    }

    fn service(&self, connector: ScriptedConnector) -> MailSyncService<ScriptedConnector> {
        MailSyncService::new(
            connector,
            Arc::clone(&self.repository),
            Arc::clone(&self.credentials) as Arc<dyn CredentialStore>,
        )
    }
}

fn imap_login(builder: &mut Builder) -> &mut Builder {
    builder
        .read(b"* OK IMAP4rev1 ready\r\n")
        .write(b"A0001 LOGIN \"alice@example.com\" \"secret\"\r\n")
        .read(b"A0001 OK LOGIN completed\r\n")
}

fn pop3_pass(fetches: &[(&str, &str)]) -> Mock {
    let mut builder = Builder::new();
    builder
        .read(b"+OK POP3 ready\r\n")
        .write(b"USER bob@example.com\r\n")
        .read(b"+OK\r\n")
        .write(b"PASS secret\r\n")
        .read(b"+OK logged in\r\n")
        .write(b"STAT\r\n")
        .read(b"+OK 2 320\r\n")
        .write(b"UIDL\r\n")
        .read(b"+OK\r\n1 uid-a\r\n2 uid-b\r\n.\r\n");
    for (command, reply) in fetches {
        builder.write(command.as_bytes()).read(reply.as_bytes());
    }
    builder.write(b"QUIT\r\n").read(b"+OK bye\r\n").build()
}

#[tokio::test]
async fn test_empty_folder_syncs_nothing() {
    let account = imap_account();
    let fixture = Fixture::new(&[&account]).await;

    let mock = imap_login(&mut Builder::new())
        .write(b"A0002 LIST \"\" \"*\"\r\n")
        .read(b"* LIST (\\HasNoChildren) \"/\" \"INBOX\"\r\nA0002 OK LIST completed\r\n")
        .write(b"A0003 SELECT \"INBOX\"\r\n")
        .read(b"* 0 EXISTS\r\n* 0 RECENT\r\n* OK [UIDVALIDITY 1] UIDs valid\r\n")
        .read(b"* OK [UIDNEXT 1] Predicted next UID\r\nA0003 OK [READ-WRITE] SELECT completed\r\n")
        .write(b"A0004 LOGOUT\r\n")
        .read(b"* BYE logging out\r\nA0004 OK LOGOUT completed\r\n")
        .build();
    let service = fixture.service(ScriptedConnector::new().with(mock));

    assert_eq!(service.sync(&account).await.unwrap(), 0);

    let folders = fixture.repository.list_folders(&account.id).await.unwrap();
    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0].id, format!("{}-INBOX", account.id));
    assert_eq!(folders[0].uid_validity, Some(1));
}

#[tokio::test]
async fn test_failing_folder_is_skipped() {
    let account = imap_account();
    let fixture = Fixture::new(&[&account]).await;

    let fetch = format!(
        "* 1 FETCH (BODY[HEADER] {{{}}}\r\n{INBOX_HEADER})\r\nA0005 OK FETCH completed\r\n",
        INBOX_HEADER.len()
    );
    let mock = imap_login(&mut Builder::new())
        .write(b"A0002 LIST \"\" \"*\"\r\n")
        .read(concat!(
            "* LIST (\\HasNoChildren) \"/\" \"Archive\"\r\n",
            "* LIST (\\HasNoChildren) \"/\" \"INBOX\"\r\n",
            "A0002 OK LIST completed\r\n"
        ).as_bytes())
        .write(b"A0003 SELECT \"Archive\"\r\n")
        .read_error(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
        .write(b"A0004 SELECT \"INBOX\"\r\n")
        .read(b"* 1 EXISTS\r\n* OK [UIDVALIDITY 9] ok\r\nA0004 OK [READ-WRITE] SELECT completed\r\n")
        .write(b"A0005 FETCH 1:1 (BODY.PEEK[HEADER])\r\n")
        .read(fetch.as_bytes())
        .write(b"A0006 LOGOUT\r\n")
        .read(b"A0006 OK LOGOUT completed\r\n")
        .build();
    let service = fixture.service(ScriptedConnector::new().with(mock));

    assert_eq!(service.sync(&account).await.unwrap(), 1);

    let inbox = format!("{}-INBOX", account.id);
    let messages = fixture
        .repository
        .list_messages(&account.id, Some(&inbox), 10, 0)
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, "<b1@example.com>");
    assert_eq!(messages[0].subject.as_deref(), Some("Hello"));
    assert_eq!(messages[0].body_plain, None);

    let folders = fixture.repository.list_folders(&account.id).await.unwrap();
    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0].full_path, "INBOX");
}

#[tokio::test]
async fn test_noselect_folder_and_most_recent_range() {
    let account = imap_account();
    let fixture = Fixture::new(&[&account]).await;

    let fetch = format!(
        "* 120 FETCH (BODY[HEADER] {{{}}}\r\n{INBOX_HEADER})\r\nA0004 OK FETCH completed\r\n",
        INBOX_HEADER.len()
    );
    let mock = imap_login(&mut Builder::new())
        .write(b"A0002 LIST \"\" \"*\"\r\n")
        .read(concat!(
            "* LIST (\\Noselect \\HasChildren) \"/\" \"Work\"\r\n",
            "* LIST (\\HasNoChildren) \"/\" \"Work/Reports\"\r\n",
            "A0002 OK LIST completed\r\n"
        ).as_bytes())
        .write(b"A0003 SELECT \"Work/Reports\"\r\n")
        .read(b"* 120 EXISTS\r\nA0003 OK [READ-WRITE] SELECT completed\r\n")
        .write(b"A0004 FETCH 71:120 (BODY.PEEK[HEADER])\r\n")
        .read(fetch.as_bytes())
        .write(b"A0005 LOGOUT\r\n")
        .read(b"A0005 OK LOGOUT completed\r\n")
        .build();
    let service = fixture.service(ScriptedConnector::new().with(mock));

    assert_eq!(service.sync(&account).await.unwrap(), 1);

    let folders = fixture.repository.list_folders(&account.id).await.unwrap();
    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0].name, "Reports");
    assert_eq!(folders[0].parent_id, Some(format!("{}-Work", account.id)));
}

#[tokio::test]
async fn test_login_failure_aborts_and_disconnects() {
    let account = imap_account();
    let fixture = Fixture::new(&[&account]).await;

    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"A0001 LOGIN \"alice@example.com\" \"secret\"\r\n")
        .read(b"A0001 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
        .write(b"A0002 LOGOUT\r\n")
        .read(b"A0002 OK LOGOUT completed\r\n")
        .build();
    let service = fixture.service(ScriptedConnector::new().with(mock));

    let err = service.sync(&account).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_server_after_retries() {
    let account = imap_account();
    let fixture = Fixture::new(&[&account]).await;
    let connector = ScriptedConnector::new().refusing().refusing().refusing();
    let service = fixture.service(connector.clone());

    let err = service.sync(&account).await.unwrap_err();
    assert!(matches!(err, Error::ServerNotResponding));
    assert_eq!(connector.connects(), 3);
}

#[tokio::test]
async fn test_missing_password() {
    let account = imap_account();
    let fixture = Fixture::new(&[&account]).await;
    fixture.credentials.delete(account.id.as_str()).unwrap();
    let connector = ScriptedConnector::new();
    let service = fixture.service(connector.clone());

    let err = service.sync(&account).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
    assert_eq!(connector.connects(), 0);
}

#[tokio::test]
async fn test_pop3_skips_downloaded_messages() {
    let account = pop3_account();
    let fixture = Fixture::new(&[&account]).await;

    let first_pass = pop3_pass(&[
        (
            "RETR 1\r\n",
            "+OK\r\nMessage-ID: <a@example.com>\r\nSubject: First\r\n\r\nBody one\r\n.\r\n",
        ),
        ("RETR 2\r\n", "+OK\r\nSubject: No id\r\n\r\nBody two\r\n.\r\n"),
    ]);
    let second_pass = pop3_pass(&[]);
    let connector = ScriptedConnector::new().with(first_pass).with(second_pass);
    let service = fixture.service(connector);

    assert_eq!(service.sync(&account).await.unwrap(), 2);
    assert_eq!(service.sync(&account).await.unwrap(), 0);

    let first = fixture.repository.get_message("<a@example.com>").await.unwrap().unwrap();
    assert_eq!(first.folder_id, None);
    assert_eq!(first.body_plain.as_deref(), Some("Body one"));

    let second = fixture
        .repository
        .get_message(&format!("{}-uid-b", account.id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.subject.as_deref(), Some("No id"));
}

#[tokio::test]
async fn test_pop3_missing_message_is_skipped() {
    let account = pop3_account();
    let fixture = Fixture::new(&[&account]).await;

    let mock = pop3_pass(&[
        ("RETR 1\r\n", "-ERR message deleted\r\n"),
        ("RETR 2\r\n", "+OK\r\nSubject: Still here\r\n\r\nBody\r\n.\r\n"),
    ]);
    let service = fixture.service(ScriptedConnector::new().with(mock));

    assert_eq!(service.sync(&account).await.unwrap(), 1);
}

#[tokio::test]
async fn test_pop3_pass_stops_when_session_breaks() {
    let account = pop3_account();
    let fixture = Fixture::new(&[&account]).await;

    let mock = Builder::new()
        .read(b"+OK POP3 ready\r\n")
        .write(b"USER bob@example.com\r\n")
        .read(b"+OK\r\n")
        .write(b"PASS secret\r\n")
        .read(b"+OK logged in\r\n")
        .write(b"STAT\r\n")
        .read(b"+OK 2 320\r\n")
        .write(b"UIDL\r\n")
        .read(b"+OK\r\n1 uid-a\r\n2 uid-b\r\n.\r\n")
        .write(b"RETR 1\r\n")
        .read(b"+OK\r\nSubject: One\r\n")
        .read_error(std::io::Error::other("connection reset"))
        .build();
    let service = fixture.service(ScriptedConnector::new().with(mock));

    let err = service.sync(&account).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
    assert!(fixture.repository.known_uidls(&account.id).await.unwrap().is_empty());
    assert!(
        fixture
            .repository
            .list_messages(&account.id, None, 10, 0)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_sync_all_isolates_failures() {
    let broken = imap_account();
    let mut working = pop3_account();
    working.created_at = broken.created_at + chrono::Duration::seconds(1);
    let fixture = Fixture::new(&[&broken, &working]).await;
    fixture.credentials.delete(broken.id.as_str()).unwrap();

    let mock = pop3_pass(&[
        ("RETR 1\r\n", "+OK\r\nSubject: One\r\n\r\nBody\r\n.\r\n"),
        ("RETR 2\r\n", "+OK\r\nSubject: Two\r\n\r\nBody\r\n.\r\n"),
    ]);
    let options = SyncOptions {
        retry: RetryPolicy::once(),
        io_timeout: Duration::from_secs(5),
        ..SyncOptions::default()
    };
    let service = fixture
        .service(ScriptedConnector::new().with(mock))
        .with_options(options);
    let coordinator = SyncCoordinator::new(service);

    let reports = coordinator.sync_all().await.unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].account_id, broken.id);
    assert!(reports[0].result.is_err());
    assert_eq!(reports[1].email, "bob@example.com");
    assert_eq!(reports[1].synced(), 2);
}

#[tokio::test]
async fn test_sync_unknown_account() {
    let fixture = Fixture::new(&[]).await;
    let coordinator = SyncCoordinator::new(fixture.service(ScriptedConnector::new()));
    let err = coordinator
        .sync_account(&"missing".into())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AccountNotFound(_)));
}
