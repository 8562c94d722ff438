//! Dispatch engine: bounded-parallel generation over a work list.

pub mod dispatcher;
pub mod outcome;

pub use dispatcher::{DispatchConfig, Dispatcher};
pub use outcome::{FailureReporting, ItemOutcome, RunSummary};
