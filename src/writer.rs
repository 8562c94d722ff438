//! Buffered append-only log writer.
//!
//! Producers push whole lines into an unbounded channel through a cheap,
//! cloneable [`LogSink`]. A single background task owns the destination and
//! drains everything pending on every tick, writing each non-blank line and
//! flushing after it. Stopping the writer (explicitly, or by dropping it)
//! performs one last drain before the destination is released.
//!
//! Lines from one producer keep their order; lines from different producers
//! interleave in whatever order they reached the channel.

use std::path::Path;
use std::time::Duration;

use opentelemetry::KeyValue;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::telemetry::metrics;

/// Producer handle for a [`BufferedLogWriter`].
///
/// `enqueue` never blocks. Once the writer has stopped, or its flush task
/// has died on a write error, lines are refused and `enqueue` returns
/// `false`.
#[derive(Debug, Clone)]
pub struct LogSink {
    tx: UnboundedSender<String>,
}

impl LogSink {
    /// Queue one line. Returns whether the writer accepted it.
    #[must_use]
    pub fn enqueue(&self, line: impl Into<String>) -> bool {
        self.tx.send(line.into()).is_ok()
    }

    /// True once the writer no longer accepts lines.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A durable, non-blocking line sink with a periodic flush task.
pub struct BufferedLogWriter {
    name: String,
    sink: LogSink,
    stop: CancellationToken,
    task: Option<JoinHandle<std::io::Result<u64>>>,
    // Cancels the flush task if the writer is dropped without `stop()`.
    _guard: DropGuard,
}

impl BufferedLogWriter {
    /// Open `path` in append mode (creating it) and start flushing every
    /// `interval`.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn open_append(path: &Path, interval: Duration) -> Result<Self> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| Error::Other(format!("cannot open {}: {e}", path.display())))?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self::new(name, file, interval))
    }

    /// Start a writer over any async destination.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<W>(name: impl Into<String>, destination: W, interval: Duration) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();

        let task = tokio::spawn(flush_loop(
            name.clone(),
            destination,
            rx,
            interval,
            stop.clone(),
        ));

        Self {
            name,
            sink: LogSink { tx },
            _guard: stop.clone().drop_guard(),
            stop,
            task: Some(task),
        }
    }

    /// A producer handle that can be cloned into concurrent tasks.
    pub fn sink(&self) -> LogSink {
        self.sink.clone()
    }

    /// Queue one line for the next flush tick. Returns whether it was
    /// accepted.
    #[must_use]
    pub fn enqueue(&self, line: impl Into<String>) -> bool {
        self.sink.enqueue(line)
    }

    /// Stop the flush task after a final drain and release the destination.
    ///
    /// Returns the total number of lines written over the writer's lifetime.
    pub async fn stop(mut self) -> Result<u64> {
        self.stop.cancel();
        let Some(task) = self.task.take() else {
            return Ok(0);
        };
        let written = task
            .await
            .map_err(|e| Error::Other(format!("{} flush task panicked: {e}", self.name)))??;
        debug!(sink = %self.name, written, "writer stopped");
        Ok(written)
    }
}

async fn flush_loop<W>(
    name: String,
    mut destination: W,
    mut rx: UnboundedReceiver<String>,
    interval: Duration,
    stop: CancellationToken,
) -> std::io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut written = 0u64;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                match drain(&mut destination, &mut rx).await {
                    Ok(n) => {
                        written += n;
                        record_flushed(&name, n);
                    }
                    Err(e) => {
                        error!(sink = %name, error = %e, "flush failed, stopping writer");
                        return Err(e);
                    }
                }
            }
        }
    }

    // Refuse new lines, then write whatever made it into the queue.
    rx.close();
    let n = drain(&mut destination, &mut rx).await?;
    written += n;
    record_flushed(&name, n);
    destination.shutdown().await?;
    Ok(written)
}

/// Write every line currently queued. Blank lines are dropped.
async fn drain<W>(destination: &mut W, rx: &mut UnboundedReceiver<String>) -> std::io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    while let Ok(line) = rx.try_recv() {
        if line.trim().is_empty() {
            continue;
        }
        destination.write_all(line.as_bytes()).await?;
        destination.write_all(b"\n").await?;
        destination.flush().await?;
        written += 1;
    }
    Ok(written)
}

fn record_flushed(name: &str, n: u64) {
    if n > 0 {
        metrics::lines_flushed().add(n, &[KeyValue::new("sink", name.to_string())]);
    }
}
