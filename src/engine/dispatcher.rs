//! Dispatcher: runs the work list through the generation client with at
//! most K calls in flight, routing results and completion markers to the
//! two buffered writers.
//!
//! Every item is its own error boundary. A failing, timing-out, or even
//! panicking call only affects that item, which stays unprocessed and is
//! picked up again by the next run.

use std::sync::Arc;

use opentelemetry::KeyValue;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};
use uuid::Uuid;

use super::outcome::{FailureReporting, ItemOutcome, RunSummary};
use crate::llm::{GenerateError, GenerationClient};
use crate::model::InputItem;
use crate::source::WorkList;
use crate::telemetry::{item as item_span, metrics};
use crate::writer::LogSink;

/// Dispatcher knobs.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum concurrent generate calls. Values below 1 are treated as 1.
    pub max_concurrency: usize,
    pub failure_reporting: FailureReporting,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            failure_reporting: FailureReporting::default(),
        }
    }
}

/// Fans a work list out to a [`GenerationClient`].
pub struct Dispatcher<C> {
    ctx: ItemContext<C>,
    max_concurrency: usize,
}

/// Everything one spawned item task needs.
struct ItemContext<C> {
    client: Arc<C>,
    results: LogSink,
    processed: LogSink,
    reporting: FailureReporting,
}

impl<C> Clone for ItemContext<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            results: self.results.clone(),
            processed: self.processed.clone(),
            reporting: self.reporting,
        }
    }
}

impl<C: GenerationClient + 'static> Dispatcher<C> {
    pub fn new(client: Arc<C>, results: LogSink, processed: LogSink, config: DispatchConfig) -> Self {
        Self {
            ctx: ItemContext {
                client,
                results,
                processed,
                reporting: config.failure_reporting,
            },
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    /// Process every item in `work`, returning once all admitted items have
    /// finished.
    ///
    /// Items are admitted in list order as slots free up. Cancelling
    /// `cancel` stops admission and makes in-flight calls unwind without
    /// marking their items processed.
    pub async fn run(&self, work: WorkList, cancel: CancellationToken) -> RunSummary {
        let run_id = Uuid::new_v4();
        let total = work.items.len();
        info!(%run_id, total, max_concurrency = self.max_concurrency, "dispatch started");

        let slots = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks: JoinSet<ItemOutcome> = JoinSet::new();
        let mut summary = RunSummary::default();
        let mut admitted = 0usize;

        for item in work.items {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            while let Some(joined) = tasks.try_join_next() {
                summary.absorb(&settle(joined));
            }

            let ctx = self.ctx.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let outcome = ctx.process(item, &cancel).await;
                drop(permit);
                outcome
            });
            admitted += 1;
        }

        while let Some(joined) = tasks.join_next().await {
            summary.absorb(&settle(joined));
        }
        summary.not_started = total - admitted;

        info!(
            %run_id,
            completed = summary.completed,
            timed_out = summary.timed_out,
            failed = summary.failed,
            cancelled = summary.cancelled,
            not_started = summary.not_started,
            records = summary.records,
            "dispatch finished"
        );
        summary
    }
}

impl<C: GenerationClient> ItemContext<C> {
    async fn process(&self, item: InputItem, cancel: &CancellationToken) -> ItemOutcome {
        let span = item_span::start_item_span(&item.key, item.rank);

        let outcome = async {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(GenerateError::Cancelled),
                result = self.client.generate(&item, cancel) => result,
            };
            self.route(&item, result)
        }
        .instrument(span.clone())
        .await;

        item_span::record_outcome(&span, outcome.label());
        metrics::items_dispatched().add(1, &[KeyValue::new("outcome", outcome.label())]);
        outcome
    }

    /// Queue the records and the completion marker, or report the failure.
    fn route(
        &self,
        item: &InputItem,
        result: Result<Vec<crate::model::OutputRecord>, GenerateError>,
    ) -> ItemOutcome {
        match result {
            Ok(records) => {
                let mut accepted = true;
                for record in &records {
                    accepted &= self.results.enqueue(record.to_line());
                }
                // No marker unless every record reached the results writer.
                if !accepted || !self.processed.enqueue(item.key.clone()) {
                    error!(key = %item.key, "log writer closed, item not processed");
                    return ItemOutcome::Failed {
                        kind: "sink".to_string(),
                    };
                }
                metrics::records_generated().add(records.len() as u64, &[]);
                debug!(key = %item.key, records = records.len(), "item completed");
                ItemOutcome::Completed {
                    records: records.len(),
                }
            }
            Err(e) if e.is_timeout() => {
                warn!(key = %item.key, "{} not processed due to timeout", item.key);
                ItemOutcome::TimedOut
            }
            Err(GenerateError::Cancelled) => {
                debug!(key = %item.key, "item cancelled");
                ItemOutcome::Cancelled
            }
            Err(e) => {
                if self.reporting == FailureReporting::Logged {
                    warn!(key = %item.key, kind = e.kind(), error = %e, "item not processed");
                }
                ItemOutcome::Failed {
                    kind: e.kind().to_string(),
                }
            }
        }
    }
}

/// Map a joined task onto an outcome. A panicked item counts as failed.
fn settle(joined: Result<ItemOutcome, JoinError>) -> ItemOutcome {
    match joined {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "item task aborted");
            ItemOutcome::Failed {
                kind: if e.is_panic() { "panic" } else { "aborted" }.to_string(),
            }
        }
    }
}
