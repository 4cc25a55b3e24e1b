//! Error types for checkpoint operations

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur during checkpoint operations
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Checkpoint not found
    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Binary serialization error
    #[error("Binary serialization error: {0}")]
    BinarySerialization(#[from] bincode::Error),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid checkpoint or configuration
    #[error("Invalid checkpoint: {0}")]
    Invalid(String),

    /// Channel read/update error
    #[error("Channel '{channel}' error: {error}")]
    Channel {
        /// Channel the operation targeted
        channel: String,
        /// Error description
        error: String,
    },

    /// Channel read before any value was written
    #[error("Channel '{0}' is empty")]
    EmptyChannel(String),

    /// Custom error
    #[error("{0}")]
    Custom(String),
}

impl CheckpointError {
    /// Create a channel error with context
    pub fn channel(channel: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Channel {
            channel: channel.into(),
            error: error.into(),
        }
    }
}
