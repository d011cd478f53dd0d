mod common;

use assert_cmd::Command;
use common::{feed_with, record_ok, StubResponse, StubServer, SESSION_OK};
use predicates::prelude::*;
use serial_test::serial;
use std::fs;
use std::net::TcpListener;
use std::path::Path;
use tempfile::{tempdir, TempDir};

/// A command isolated from the developer's environment: empty working dir, no credentials.
fn paperbot(workdir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("paperbot").expect("Binary exists");
    cmd.current_dir(workdir.path())
        .env_remove("BSKY_HANDLE")
        .env_remove("BSKY_PASS")
        .env("RUST_LOG", "warn");
    cmd
}

fn write_config(dir: &Path, feed_base_url: &str, bluesky_service: &str) -> std::path::PathBuf {
    let path = dir.join("paperbot.yaml");
    fs::write(
        &path,
        format!(
            "ledger_path: {}\nfeed_base_url: {feed_base_url}\npost_delay_secs: 0\nbluesky_service: {bluesky_service}\n",
            dir.join("pubdb.txt").display()
        ),
    )
    .unwrap();
    path
}

#[test]
fn no_subject_prints_usage_and_exits_1() {
    let dir = tempdir().unwrap();
    paperbot(&dir)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn two_subjects_print_usage_and_exit_1() {
    let dir = tempdir().unwrap();
    paperbot(&dir)
        .args(["cs.CL", "cs.LG"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn help_exits_successfully() {
    let dir = tempdir().unwrap();
    paperbot(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("SUBJECT"));
}

#[test]
fn missing_credentials_fail_before_fetching() {
    let dir = tempdir().unwrap();
    paperbot(&dir)
        .arg("cs.CL")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("BSKY_HANDLE"));
    assert!(!dir.path().join("pubdb.txt").exists());
}

#[test]
fn unreachable_feed_exits_1_and_keeps_ledger() {
    let dir = tempdir().unwrap();
    let closed_port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = write_config(
        dir.path(),
        &format!("http://127.0.0.1:{closed_port}/rss"),
        &format!("http://127.0.0.1:{closed_port}"),
    );
    let ledger = dir.path().join("pubdb.txt");
    let before = "oai:arXiv.org:2401.00001v1\t2024-01-02T05:00:00+00:00\n";
    fs::write(&ledger, before).unwrap();

    paperbot(&dir)
        .arg("cs.CL")
        .arg("--config")
        .arg(&config)
        .env("BSKY_HANDLE", "paperbot.test")
        .env("BSKY_PASS", "app-password")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to fetch feed"));

    assert_eq!(fs::read_to_string(&ledger).unwrap(), before);
}

#[test]
fn new_papers_are_posted_once_across_runs() {
    let dir = tempdir().unwrap();
    let feed = feed_with(&[("2401.00002", "Second Paper"), ("2401.00001", "First Paper")]);

    // First run: both papers are new.
    let server = StubServer::start(vec![
        StubResponse::rss(&feed),
        StubResponse::json(200, SESSION_OK),
        StubResponse::json(200, &record_ok("a")),
        StubResponse::json(200, &record_ok("b")),
    ]);
    let config = write_config(
        dir.path(),
        &format!("{}/rss", server.base_url),
        &server.base_url,
    );

    paperbot(&dir)
        .arg("cs.CL")
        .arg("--config")
        .arg(&config)
        .env("BSKY_HANDLE", "paperbot.test")
        .env("BSKY_PASS", "app-password")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Posted to: at://did:plc:paperbot/app.bsky.feed.post/a")
                .and(predicate::str::contains(
                    "Posted to: at://did:plc:paperbot/app.bsky.feed.post/b",
                )),
        );

    let requests = server.requests();
    assert!(requests[0].starts_with("GET /rss/cs.CL "));
    assert!(requests[2].contains("Second Paper"));
    assert!(requests[3].contains("First Paper"));

    let ledger_path = dir.path().join("pubdb.txt");
    let ledger = fs::read_to_string(&ledger_path).unwrap();
    assert_eq!(
        ledger,
        "oai:arXiv.org:2401.00001v1\t2024-01-02T05:00:00+00:00\n\
         oai:arXiv.org:2401.00002v1\t2024-01-02T05:00:00+00:00\n"
    );

    // Second run: same feed, nothing to post, ledger unchanged.
    let server = StubServer::start(vec![StubResponse::rss(&feed)]);
    let config = write_config(
        dir.path(),
        &format!("{}/rss", server.base_url),
        &server.base_url,
    );

    paperbot(&dir)
        .arg("cs.CL")
        .arg("--config")
        .arg(&config)
        .env("BSKY_HANDLE", "paperbot.test")
        .env("BSKY_PASS", "app-password")
        .assert()
        .success()
        .stdout(predicate::str::contains("Posted to").not());

    assert_eq!(server.requests().len(), 1);
    assert_eq!(fs::read_to_string(&ledger_path).unwrap(), ledger);
}

#[test]
fn posts_made_before_an_auth_failure_are_still_reported() {
    let dir = tempdir().unwrap();
    let feed = feed_with(&[("2401.00001", "First Paper"), ("2401.00002", "Second Paper")]);
    let server = StubServer::start(vec![
        StubResponse::rss(&feed),
        StubResponse::json(200, SESSION_OK),
        StubResponse::json(200, &record_ok("a")),
        StubResponse::json(401, r#"{"error":"ExpiredToken","message":"Token has expired"}"#),
    ]);
    let config = write_config(
        dir.path(),
        &format!("{}/rss", server.base_url),
        &server.base_url,
    );

    let assert = paperbot(&dir)
        .arg("cs.CL")
        .arg("--config")
        .arg(&config)
        .env("BSKY_HANDLE", "paperbot.test")
        .env("BSKY_PASS", "app-password")
        .assert()
        .code(1)
        .stdout(predicate::str::contains(
            "Posted to: at://did:plc:paperbot/app.bsky.feed.post/a",
        ));

    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    let summary = stderr
        .lines()
        .find(|l| l.starts_with("[ERROR]"))
        .expect("error summary line");
    assert_eq!(
        summary.matches("Token has expired").count(),
        1,
        "cause should be printed once: {summary}"
    );
    assert_eq!(server.requests().len(), 4);
    assert_eq!(
        fs::read_to_string(dir.path().join("pubdb.txt")).unwrap(),
        "oai:arXiv.org:2401.00001v1\t2024-01-02T05:00:00+00:00\n"
    );
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::Context, Layer, Registry};
use tracing_subscriber::prelude::*;

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{:?}", event));
    }
}

#[tokio::test]
#[serial]
async fn run_without_credentials_reports_the_missing_variable() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    std::env::remove_var("BSKY_HANDLE");
    std::env::remove_var("BSKY_PASS");

    use paperbot::cli::{run, Cli};
    let cli = Cli {
        subject: "cs.CL".to_string(),
        config: None,
        ledger: Some(std::path::PathBuf::from("unused-ledger.txt")),
        delay_secs: Some(0),
    };

    let err = run(cli).await.unwrap_err();
    assert!(err.to_string().contains("BSKY_HANDLE"));

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("paperbot run starting")),
        "Expected a start event, got: {:?}",
        event_msgs
    );
    assert!(
        event_msgs.iter().any(|msg| msg.contains("BSKY_HANDLE missing")),
        "Expected a missing-credential event, got: {:?}",
        event_msgs
    );
}
