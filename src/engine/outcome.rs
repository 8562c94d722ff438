//! Per-item results and run totals.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How one item left the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Generate returned; `records` lines were queued and the key marked processed.
    Completed { records: usize },
    /// The call ran past its deadline. Not marked processed.
    TimedOut,
    /// Any other failure. Not marked processed.
    Failed { kind: String },
    /// The run was cancelled while the call was in flight. Not marked processed.
    Cancelled,
}

impl ItemOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::TimedOut => "timeout",
            Self::Failed { .. } => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// What to do with non-timeout generate failures.
///
/// Timeouts are always reported with the item's key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureReporting {
    /// Drop them without a log line.
    Silent,
    /// Log the key and error kind at `warn`.
    #[default]
    Logged,
}

impl fmt::Display for FailureReporting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Silent => write!(f, "silent"),
            Self::Logged => write!(f, "logged"),
        }
    }
}

impl FromStr for FailureReporting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "silent" => Ok(Self::Silent),
            "logged" => Ok(Self::Logged),
            other => Err(format!("unknown failure reporting mode: {other}")),
        }
    }
}

/// Totals for one dispatcher run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub timed_out: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Items never admitted because the run was cancelled first.
    pub not_started: usize,
    /// Output records queued for the results log.
    pub records: usize,
}

impl RunSummary {
    pub fn absorb(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Completed { records } => {
                self.completed += 1;
                self.records += records;
            }
            ItemOutcome::TimedOut => self.timed_out += 1,
            ItemOutcome::Failed { .. } => self.failed += 1,
            ItemOutcome::Cancelled => self.cancelled += 1,
        }
    }

    /// Items that were admitted and finished one way or another.
    pub fn finished(&self) -> usize {
        self.completed + self.timed_out + self.failed + self.cancelled
    }
}
