//! Ollama client tests against a minimal in-process HTTP responder.

use std::sync::Arc;
use std::time::Duration;

use phrasegen::engine::{DispatchConfig, Dispatcher};
use phrasegen::llm::{GenerateError, GenerationClient, OllamaClient};
use phrasegen::model::InputItem;
use phrasegen::source::WorkList;
use phrasegen::writer::BufferedLogWriter;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const TICK: Duration = Duration::from_millis(10);

/// How the fake daemon answers the single request it accepts.
enum Reply {
    Json(u16, String),
    Silence,
}

/// Start a one-shot server. Returns its base URL and a receiver for the
/// request body it saw.
async fn serve_once(reply: Reply) -> (String, oneshot::Receiver<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let body = read_request_body(&mut stream).await;
        let _ = tx.send(serde_json::from_slice(&body).unwrap_or(Value::Null));

        match reply {
            Reply::Json(status, payload) => {
                let response = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{payload}",
                    payload.len()
                );
                stream.write_all(response.as_bytes()).await.unwrap();
                stream.shutdown().await.ok();
            }
            Reply::Silence => {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
        }
    });

    (format!("http://{addr}"), rx)
}

async fn read_request_body(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            return Vec::new();
        }
        buf.extend_from_slice(&chunk[..n]);
        let Some(split) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..split]).to_ascii_lowercase();
        let length: usize = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        let body_start = split + 4;
        if buf.len() >= body_start + length {
            return buf[body_start..body_start + length].to_vec();
        }
    }
}

fn envelope(reply: Value) -> String {
    json!({
        "model": "gemma3:latest",
        "response": reply.to_string(),
        "done": true,
        "prompt_eval_count": 40,
        "eval_count": 120
    })
    .to_string()
}

#[tokio::test]
async fn request_carries_prompt_and_schema_and_reply_becomes_records() {
    let reply = json!({"phrases": [
        {"phrase": "我们一起去公园", "pinyin": "wǒ men yì qǐ qù gōng yuán", "translation": "let's go to the park together", "context": "weekend plans"},
        {"phrase": "一点儿也不累", "pinyin": "yì diǎnr yě bú lèi", "translation": "not tired at all", "context": "after sports"}
    ]});
    let (url, seen) = serve_once(Reply::Json(200, envelope(reply))).await;
    let client = OllamaClient::new(&url, "gemma3:latest", Duration::from_secs(5)).unwrap();

    let records = client
        .generate(&InputItem::new(2, "一"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].key, "一");
    assert_eq!(records[0].phrase, "我们一起去公园");
    assert_eq!(records[1].translation, "not tired at all");

    let request = seen.await.unwrap();
    assert_eq!(request["model"], "gemma3:latest");
    assert_eq!(request["stream"], false);
    assert!(request["prompt"].as_str().unwrap().contains("\"一\""));
    assert_eq!(request["format"]["required"][0], "phrases");
}

#[tokio::test]
async fn unparseable_model_text_is_a_request_error() {
    let body = json!({"response": "sorry, I cannot do that", "done": true}).to_string();
    let (url, _seen) = serve_once(Reply::Json(200, body)).await;
    let client = OllamaClient::new(&url, "gemma3:latest", Duration::from_secs(5)).unwrap();

    let err = client
        .generate(&InputItem::new(1, "的"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GenerateError::Request(_)), "got {err:?}");
}

#[tokio::test]
async fn truncated_model_text_leaves_the_item_for_the_next_run() {
    let body = json!({"response": "{\"phrases\": [ {\"phrase\": \"truncated", "done": true}).to_string();
    let (url, _seen) = serve_once(Reply::Json(200, body)).await;
    let client = Arc::new(OllamaClient::new(&url, "gemma3:latest", Duration::from_secs(5)).unwrap());

    let dir = TempDir::new().unwrap();
    let results = BufferedLogWriter::open_append(&dir.path().join("generated.csv"), TICK)
        .await
        .unwrap();
    let processed = BufferedLogWriter::open_append(&dir.path().join("processed.csv"), TICK)
        .await
        .unwrap();
    let dispatcher = Dispatcher::new(
        client,
        results.sink(),
        processed.sink(),
        DispatchConfig::default(),
    );

    let work = WorkList {
        items: vec![InputItem::new(1, "的")],
        ..Default::default()
    };
    let summary = dispatcher.run(work, CancellationToken::new()).await;
    results.stop().await.unwrap();
    processed.stop().await.unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.completed, 0);
    let marked = std::fs::read_to_string(dir.path().join("processed.csv")).unwrap();
    assert!(marked.is_empty(), "processed log was {marked:?}");
}

#[tokio::test]
async fn error_status_is_reported() {
    let body = json!({"error": "model 'nope' not found"}).to_string();
    let (url, _seen) = serve_once(Reply::Json(404, body)).await;
    let client = OllamaClient::new(&url, "nope", Duration::from_secs(5)).unwrap();

    let err = client
        .generate(&InputItem::new(1, "的"), &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        GenerateError::Status { status, body } => {
            assert_eq!(status, 404);
            assert!(body.contains("not found"));
        }
        other => panic!("expected Status, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_service_times_out_distinctly() {
    let (url, _seen) = serve_once(Reply::Silence).await;
    let client = OllamaClient::new(&url, "gemma3:latest", Duration::from_millis(200)).unwrap();

    let err = client
        .generate(&InputItem::new(1, "的"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "got {err:?}");
}

#[tokio::test]
async fn cancellation_interrupts_the_call() {
    let (url, _seen) = serve_once(Reply::Silence).await;
    let client = OllamaClient::new(&url, "gemma3:latest", Duration::from_secs(60)).unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = client
        .generate(&InputItem::new(1, "的"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, GenerateError::Cancelled), "got {err:?}");
}

#[tokio::test]
async fn unreachable_service_is_a_request_error() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client =
        OllamaClient::new(&format!("http://{addr}"), "gemma3:latest", Duration::from_secs(5))
            .unwrap();
    let err = client
        .generate(&InputItem::new(1, "的"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GenerateError::Request(_)), "got {err:?}");
}
