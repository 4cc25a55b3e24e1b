//! Symmetric wire codec
//!
//! JSON is the default: self-describing, so operators can read the error
//! topic directly. Deployments that need a denser encoding swap this module;
//! the loop only assumes `dumps`/`loads` are inverses.

use crate::error::{Result, SchedulerError};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialize a message for the wire
pub fn dumps<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(SchedulerError::Encode)
}

/// Deserialize a message from the wire
pub fn loads<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(SchedulerError::Decode)
}
