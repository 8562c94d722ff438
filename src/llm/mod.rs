//! Generation service boundary.
//!
//! [`GenerationClient`] is the single capability the dispatcher needs: turn
//! one [`InputItem`] into zero or more [`OutputRecord`]s, or fail. Timeouts
//! are reported separately from other failures so callers can treat them
//! differently. [`OllamaClient`] talks to a local Ollama daemon.

pub mod ollama;
pub mod schema;

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::model::{InputItem, OutputRecord};

pub use ollama::OllamaClient;

/// Why a generate call produced nothing.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The call ran past its deadline and was abandoned.
    #[error("generation timed out after {after:?}")]
    Timeout { after: Duration },

    /// The run was cancelled while the call was in flight.
    #[error("generation cancelled")]
    Cancelled,

    /// The service answered with a non-success status.
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Transport failure or an unusable response envelope.
    #[error("request failed: {0}")]
    Request(String),
}

impl GenerateError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
            Self::Status { .. } => "status",
            Self::Request(_) => "request",
        }
    }
}

/// Produces structured records for one input item.
///
/// Implementations must observe `cancel` and return
/// [`GenerateError::Cancelled`] promptly once it fires.
pub trait GenerationClient: Send + Sync {
    fn generate(
        &self,
        item: &InputItem,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Vec<OutputRecord>, GenerateError>> + Send;
}
