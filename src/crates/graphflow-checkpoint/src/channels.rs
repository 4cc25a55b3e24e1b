//! Channel primitives for state propagation between super-steps
//!
//! Channels are the typed state containers a graph's nodes read from and
//! write to. Each channel kind defines its own update semantics:
//!
//! - [`LastValueChannel`] - single value, exactly one write per step
//! - [`TopicChannel`] - append-only list of values
//! - [`EphemeralValueChannel`] - holds a value for one step, then clears
//!
//! A channel's value is snapshotted into the checkpoint via [`Channel::checkpoint`]
//! and restored with [`Channel::from_checkpoint`] when a run context reopens.

use crate::error::{CheckpointError, Result};
use std::fmt::Debug;

/// State container with per-kind update semantics
pub trait Channel: Send + Sync + Debug {
    /// Read the current value.
    ///
    /// Returns [`CheckpointError::EmptyChannel`] if nothing has been written.
    fn get(&self) -> Result<serde_json::Value>;

    /// Apply a sequence of writes from one super-step.
    ///
    /// Returns `true` if the channel's value changed. An empty `values` slice
    /// marks a step boundary where this channel received no writes; most
    /// channels ignore it, ephemeral channels clear on it.
    fn update(&mut self, values: Vec<serde_json::Value>) -> Result<bool>;

    /// Snapshot the channel's state for inclusion in a checkpoint
    fn checkpoint(&self) -> Result<serde_json::Value>;

    /// Restore the channel's state from a checkpoint snapshot
    fn from_checkpoint(&mut self, checkpoint: serde_json::Value) -> Result<()>;

    /// Whether the channel currently holds a readable value
    fn is_available(&self) -> bool {
        true
    }

    /// Consume the value after it has triggered a node.
    ///
    /// Returns `true` if the channel's state changed.
    fn consume(&mut self) -> bool {
        false
    }

    /// Clone into a boxed trait object
    fn clone_box(&self) -> Box<dyn Channel>;
}

impl Clone for Box<dyn Channel> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Stores the most recent value, rejecting concurrent writes within a step
#[derive(Debug, Clone, Default)]
pub struct LastValueChannel {
    value: Option<serde_json::Value>,
}

impl LastValueChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: serde_json::Value) -> Self {
        Self { value: Some(value) }
    }
}

impl Channel for LastValueChannel {
    fn get(&self) -> Result<serde_json::Value> {
        self.value
            .clone()
            .ok_or_else(|| CheckpointError::EmptyChannel("last_value".to_string()))
    }

    fn update(&mut self, mut values: Vec<serde_json::Value>) -> Result<bool> {
        match values.len() {
            0 => Ok(false),
            1 => {
                self.value = values.pop();
                Ok(true)
            }
            n => Err(CheckpointError::channel(
                "last_value",
                format!("received {n} writes in one step, expected at most 1"),
            )),
        }
    }

    fn checkpoint(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(&self.value)?)
    }

    fn from_checkpoint(&mut self, checkpoint: serde_json::Value) -> Result<()> {
        self.value = serde_json::from_value(checkpoint)?;
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.value.is_some()
    }

    fn clone_box(&self) -> Box<dyn Channel> {
        Box::new(self.clone())
    }
}

/// Append-only channel collecting every value written to it
#[derive(Debug, Clone, Default)]
pub struct TopicChannel {
    values: Vec<serde_json::Value>,
}

impl TopicChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// All values accumulated so far
    pub fn get_all(&self) -> &[serde_json::Value] {
        &self.values
    }
}

impl Channel for TopicChannel {
    fn get(&self) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Array(self.values.clone()))
    }

    fn update(&mut self, values: Vec<serde_json::Value>) -> Result<bool> {
        if values.is_empty() {
            return Ok(false);
        }
        self.values.extend(values);
        Ok(true)
    }

    fn checkpoint(&self) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Array(self.values.clone()))
    }

    fn from_checkpoint(&mut self, checkpoint: serde_json::Value) -> Result<()> {
        match checkpoint {
            serde_json::Value::Array(values) => {
                self.values = values;
                Ok(())
            }
            other => Err(CheckpointError::channel(
                "topic",
                format!("expected array snapshot, got {other}"),
            )),
        }
    }

    fn is_available(&self) -> bool {
        !self.values.is_empty()
    }

    fn consume(&mut self) -> bool {
        if self.values.is_empty() {
            false
        } else {
            self.values.clear();
            true
        }
    }

    fn clone_box(&self) -> Box<dyn Channel> {
        Box::new(self.clone())
    }
}

/// Holds a value for exactly one step; clears at the next step boundary
/// unless written again. Used for trigger signals like the start channel.
#[derive(Debug, Clone, Default)]
pub struct EphemeralValueChannel {
    value: Option<serde_json::Value>,
}

impl EphemeralValueChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Channel for EphemeralValueChannel {
    fn get(&self) -> Result<serde_json::Value> {
        self.value
            .clone()
            .ok_or_else(|| CheckpointError::EmptyChannel("ephemeral".to_string()))
    }

    fn update(&mut self, mut values: Vec<serde_json::Value>) -> Result<bool> {
        match values.len() {
            0 => {
                let was_set = self.value.take().is_some();
                Ok(was_set)
            }
            1 => {
                self.value = values.pop();
                Ok(true)
            }
            n => Err(CheckpointError::channel(
                "ephemeral",
                format!("received {n} writes in one step, expected at most 1"),
            )),
        }
    }

    fn checkpoint(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(&self.value)?)
    }

    fn from_checkpoint(&mut self, checkpoint: serde_json::Value) -> Result<()> {
        self.value = serde_json::from_value(checkpoint)?;
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.value.is_some()
    }

    fn consume(&mut self) -> bool {
        self.value.take().is_some()
    }

    fn clone_box(&self) -> Box<dyn Channel> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_last_value_channel() {
        let mut chan = LastValueChannel::new();
        assert!(!chan.is_available());
        assert!(chan.get().is_err());

        assert!(chan.update(vec![json!(1)]).unwrap());
        assert_eq!(chan.get().unwrap(), json!(1));

        assert!(chan.update(vec![json!(2)]).unwrap());
        assert_eq!(chan.get().unwrap(), json!(2));
    }

    #[test]
    fn test_last_value_channel_rejects_multiple() {
        let mut chan = LastValueChannel::new();
        let result = chan.update(vec![json!(1), json!(2)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_topic_channel() {
        let mut chan = TopicChannel::new();
        chan.update(vec![json!("a")]).unwrap();
        chan.update(vec![json!("b"), json!("c")]).unwrap();
        assert_eq!(chan.get().unwrap(), json!(["a", "b", "c"]));

        assert!(chan.consume());
        assert!(!chan.is_available());
    }

    #[test]
    fn test_ephemeral_clears_at_step_boundary() {
        let mut chan = EphemeralValueChannel::new();
        chan.update(vec![json!({"x": 1})]).unwrap();
        assert!(chan.is_available());

        // step boundary with no writes clears the value
        assert!(chan.update(vec![]).unwrap());
        assert!(!chan.is_available());
    }

    #[test]
    fn test_checkpoint_restore() {
        let mut chan = LastValueChannel::new();
        chan.update(vec![json!({"k": "v"})]).unwrap();
        let snapshot = chan.checkpoint().unwrap();

        let mut restored = LastValueChannel::new();
        restored.from_checkpoint(snapshot).unwrap();
        assert_eq!(restored.get().unwrap(), json!({"k": "v"}));
    }
}
