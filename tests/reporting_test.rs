//! What the dispatcher writes to the log for items that do not complete.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use phrasegen::engine::{DispatchConfig, Dispatcher, FailureReporting};
use phrasegen::llm::{GenerateError, GenerationClient};
use phrasegen::model::{InputItem, OutputRecord};
use phrasegen::source::WorkList;
use phrasegen::writer::BufferedLogWriter;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::Level;

const TICK: Duration = Duration::from_millis(10);

/// Times out on `c`, fails on `f`, and returns one phrase for anything else.
struct FlakyClient;

impl GenerationClient for FlakyClient {
    async fn generate(
        &self,
        item: &InputItem,
        _cancel: &CancellationToken,
    ) -> Result<Vec<OutputRecord>, GenerateError> {
        match item.key.as_str() {
            "c" => Err(GenerateError::Timeout {
                after: Duration::from_secs(600),
            }),
            "f" => Err(GenerateError::Request("connection reset".into())),
            key => Ok(vec![OutputRecord {
                key: key.to_string(),
                phrase: format!("{key} phrase"),
                pinyin: "pin yin".into(),
                translation: "translation".into(),
                context: "context".into(),
            }]),
        }
    }
}

/// Shared buffer the fmt layer writes into.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `keys` through a dispatcher while capturing everything logged on
/// this thread.
async fn run_logged(keys: &[&str], reporting: FailureReporting) -> String {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(Level::DEBUG)
        .with_writer(move || writer.clone())
        .finish();
    let _default = tracing::subscriber::set_default(subscriber);

    let dir = TempDir::new().unwrap();
    let results = BufferedLogWriter::open_append(&dir.path().join("generated.csv"), TICK)
        .await
        .unwrap();
    let processed = BufferedLogWriter::open_append(&dir.path().join("processed.csv"), TICK)
        .await
        .unwrap();
    let dispatcher = Dispatcher::new(
        Arc::new(FlakyClient),
        results.sink(),
        processed.sink(),
        DispatchConfig {
            max_concurrency: 2,
            failure_reporting: reporting,
        },
    );

    let work = WorkList {
        items: keys
            .iter()
            .enumerate()
            .map(|(i, k)| InputItem::new(i as u32 + 1, *k))
            .collect(),
        ..Default::default()
    };
    dispatcher.run(work, CancellationToken::new()).await;
    results.stop().await.unwrap();
    processed.stop().await.unwrap();

    captured.text()
}

#[tokio::test(flavor = "current_thread")]
async fn timeout_names_the_key() {
    let logs = run_logged(&["a", "c", "e"], FailureReporting::Logged).await;
    assert!(logs.contains("c not processed due to timeout"), "logs were:\n{logs}");
    assert!(!logs.contains("a not processed due to timeout"));
}

#[tokio::test(flavor = "current_thread")]
async fn timeout_is_reported_even_when_failures_are_silent() {
    let logs = run_logged(&["c"], FailureReporting::Silent).await;
    assert!(logs.contains("c not processed due to timeout"), "logs were:\n{logs}");
}

#[tokio::test(flavor = "current_thread")]
async fn logged_mode_reports_other_failures() {
    let logs = run_logged(&["a", "f"], FailureReporting::Logged).await;
    let line = logs
        .lines()
        .find(|l| l.contains("item not processed"))
        .unwrap_or_else(|| panic!("no failure line in:\n{logs}"));
    assert!(line.contains("WARN"));
    assert!(line.contains("key=f"));
}

#[tokio::test(flavor = "current_thread")]
async fn silent_mode_says_nothing_about_other_failures() {
    let logs = run_logged(&["a", "f"], FailureReporting::Silent).await;
    assert!(!logs.contains("item not processed"), "logs were:\n{logs}");
    assert!(!logs.contains("connection reset"));
}
