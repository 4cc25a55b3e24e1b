//! Error taxonomy for the orchestrator loop
//!
//! Failures fall into four classes with different handling:
//!
//! - *Transient* (broker timeouts, store contention): retried per policy.
//! - *Unrecoverable per-message* (malformed payload, invariant violation,
//!   exhausted retries): routed to the error topic; the batch continues.
//! - *Fatal* (consumer/producer terminal failure, error-topic send failure):
//!   propagate out of the batch; the batch is not committed and replays.
//! - *Cancellation*: dropping the loop's future mid-batch leaves offsets
//!   uncommitted, so the batch is redelivered on restart.

use crate::broker::BrokerError;
use graphflow_checkpoint::CheckpointError;
use graphflow_core::GraphError;
use thiserror::Error;

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Errors raised while consuming, advancing, or dispatching
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Message payload could not be decoded
    #[error("Failed to decode message: {0}")]
    Decode(serde_json::Error),

    /// Message payload could not be encoded
    #[error("Failed to encode message: {0}")]
    Encode(serde_json::Error),

    /// Broker operation failed
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Advancing the run failed
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
}

impl SchedulerError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Broker timeouts and checkpoint storage contention are transient;
    /// decode failures and invariant violations are deterministic and will
    /// fail again.
    pub fn is_transient(&self) -> bool {
        match self {
            SchedulerError::Broker(BrokerError::Timeout(_)) => true,
            SchedulerError::Graph(GraphError::Checkpoint(CheckpointError::Storage(_))) => true,
            _ => false,
        }
    }
}
