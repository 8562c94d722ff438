//! Work source: ranked input minus already-processed keys.
//!
//! The input file is a header line followed by `rank,key` rows. Rows that do
//! not parse are reported and skipped. The processed log is optional; a
//! missing log means nothing has been done yet.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::{InputItem, ProcessedSet};

/// A row of the input file that could not be turned into an [`InputItem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRecord {
    /// 1-based line number in the input file.
    pub line: usize,
    pub content: String,
    pub reason: String,
}

/// The remaining work for one run, ordered by rank ascending.
///
/// Computed once at startup and never re-filtered during the run.
#[derive(Debug, Clone, Default)]
pub struct WorkList {
    pub items: Vec<InputItem>,
    /// Input rows that were dropped while loading.
    pub skipped: Vec<MalformedRecord>,
    /// Size of the processed set the list was filtered against.
    pub already_processed: usize,
}

impl WorkList {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Counts behind the `status` report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkStatus {
    /// Input rows that parsed.
    pub rows: usize,
    pub malformed: usize,
    /// Rows within the cutoff, processed or not.
    pub eligible: usize,
    /// Distinct keys in the processed log.
    pub processed: usize,
    /// Rows a run with the same cutoff would dispatch.
    pub remaining: usize,
}

/// Loads ranked input and the processed log for a run.
#[derive(Debug, Clone)]
pub struct WorkSource {
    input: PathBuf,
    processed: PathBuf,
}

impl WorkSource {
    pub fn new(input: impl Into<PathBuf>, processed: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            processed: processed.into(),
        }
    }

    /// Build the work list for items with `rank <= cutoff` that are not in
    /// the processed set.
    ///
    /// # Errors
    ///
    /// [`Error::SourceUnavailable`] if the input file cannot be read.
    /// A processed log that exists but cannot be read is an [`Error::Io`].
    pub async fn load(&self, cutoff: u32) -> Result<WorkList> {
        let (mut items, skipped) = self.read_items().await?;
        items.sort_by_key(|item| item.rank);

        let processed = self.read_processed().await?;
        let total = items.len();

        let items: Vec<InputItem> = items
            .into_iter()
            .filter(|item| is_pending(item, &processed, cutoff))
            .collect();

        info!(
            input = %self.input.display(),
            total,
            skipped = skipped.len(),
            processed = processed.len(),
            remaining = items.len(),
            cutoff,
            "work list loaded"
        );

        Ok(WorkList {
            items,
            skipped,
            already_processed: processed.len(),
        })
    }

    /// Summarize progress without building a work list.
    ///
    /// `remaining` always equals what [`load`](Self::load) would return for
    /// the same `cutoff`.
    pub async fn status(&self, cutoff: u32) -> Result<WorkStatus> {
        let (items, skipped) = self.read_items().await?;
        let processed = self.read_processed().await?;

        Ok(WorkStatus {
            rows: items.len(),
            malformed: skipped.len(),
            eligible: items.iter().filter(|item| item.rank <= cutoff).count(),
            processed: processed.len(),
            remaining: items
                .iter()
                .filter(|item| is_pending(item, &processed, cutoff))
                .count(),
        })
    }

    /// Parse every row of the input file, collecting malformed ones.
    pub async fn read_items(&self) -> Result<(Vec<InputItem>, Vec<MalformedRecord>)> {
        let contents = tokio::fs::read_to_string(&self.input)
            .await
            .map_err(|source| Error::SourceUnavailable {
                path: self.input.clone(),
                source,
            })?;

        Ok(parse_items(&contents))
    }

    /// Read the processed log, treating a missing file as empty.
    pub async fn read_processed(&self) -> Result<ProcessedSet> {
        read_processed_log(&self.processed).await
    }
}

/// Whether a run with `cutoff` should dispatch `item`.
pub fn is_pending(item: &InputItem, processed: &ProcessedSet, cutoff: u32) -> bool {
    item.rank <= cutoff && !processed.contains(&item.key)
}

/// Read a processed log, treating a missing file as an empty set.
pub async fn read_processed_log(path: &Path) -> Result<ProcessedSet> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(ProcessedSet::from_log(&contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no processed log yet");
            Ok(ProcessedSet::new())
        }
        Err(e) => Err(Error::Io(e)),
    }
}

/// Parse input file contents. The first line is a header.
pub fn parse_items(contents: &str) -> (Vec<InputItem>, Vec<MalformedRecord>) {
    let mut items = Vec::new();
    let mut skipped = Vec::new();

    for (idx, raw) in contents.lines().enumerate().skip(1) {
        let row = raw.trim();
        if row.is_empty() {
            continue;
        }
        match parse_row(row) {
            Ok(item) => items.push(item),
            Err(reason) => {
                let record = MalformedRecord {
                    line: idx + 1,
                    content: raw.to_string(),
                    reason,
                };
                warn!(line = record.line, content = %record.content, reason = %record.reason, "skipping malformed row");
                skipped.push(record);
            }
        }
    }

    (items, skipped)
}

fn parse_row(row: &str) -> std::result::Result<InputItem, String> {
    let mut columns = row.split(',').map(str::trim);
    let rank = columns.next().unwrap_or_default();
    let key = columns
        .next()
        .ok_or_else(|| "missing key column".to_string())?;

    let rank: u32 = rank
        .parse()
        .map_err(|e| format!("bad rank {rank:?}: {e}"))?;
    if rank == 0 {
        return Err("rank must be positive".to_string());
    }
    if key.is_empty() {
        return Err("empty key".to_string());
    }

    Ok(InputItem::new(rank, key))
}
