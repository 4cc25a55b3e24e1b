//! Error types for graph construction and super-step execution

use thiserror::Error;

/// Convenience result type using [`GraphError`]
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised while building a graph or advancing a run
#[derive(Error, Debug)]
pub enum GraphError {
    /// Graph structure validation failed
    ///
    /// Raised at build time: an edge or trigger names an undeclared channel,
    /// the input channel set is empty, a node name collides with a reserved
    /// channel name.
    #[error("Graph validation failed: {0}")]
    Validation(String),

    /// A run could not be advanced
    #[error("Execution failed: {0}")]
    Execution(String),

    /// A required configuration key was missing or malformed
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The run's thread is missing from the checkpoint store
    #[error("Run not found for thread '{0}'")]
    RunNotFound(String),

    /// Checkpoint persistence error
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] graphflow_checkpoint::CheckpointError),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A background persistence task panicked or was cancelled
    #[error("Checkpoint write task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
