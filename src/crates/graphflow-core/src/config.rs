//! Run configuration envelope
//!
//! Every message that reaches the orchestrator carries a [`RunConfig`] whose
//! `configurable` sub-map identifies the run and carries capability handles
//! injected by the host. The map is heterogeneous on the wire; here it is a
//! typed envelope with the small set of recognized keys as fields and an
//! opaque flattened carry-through for everything else, so host-injected
//! handles survive a round trip through the orchestrator untouched.

use crate::error::{GraphError, Result};
use graphflow_checkpoint::CheckpointConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The `configurable` sub-map of a run configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Configurable {
    /// Opaque identifier of the run (thread/session key)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    /// Checkpoint the config refers to, when pinned to one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,

    /// Checkpoint namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_ns: Option<String>,

    /// Set by the orchestrator on dispatched executor messages; tells the
    /// executor to reject tasks it has already run
    #[serde(
        rename = "dedupe_tasks",
        skip_serializing_if = "Option::is_none"
    )]
    pub dedupe_tasks: Option<bool>,

    /// Host-injected capability handles and any unrecognized keys,
    /// passed through unchanged
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Configurable {
    /// Merge `patch` over this map: recognized keys from the patch win,
    /// extras union with the patch winning on collisions. The carry-through
    /// is never dropped.
    pub fn patched_with(&self, patch: &Configurable) -> Configurable {
        let mut extra = self.extra.clone();
        extra.extend(patch.extra.clone());
        Configurable {
            thread_id: patch.thread_id.clone().or_else(|| self.thread_id.clone()),
            checkpoint_id: patch
                .checkpoint_id
                .clone()
                .or_else(|| self.checkpoint_id.clone()),
            checkpoint_ns: patch
                .checkpoint_ns
                .clone()
                .or_else(|| self.checkpoint_ns.clone()),
            dedupe_tasks: patch.dedupe_tasks.or(self.dedupe_tasks),
            extra,
        }
    }
}

/// Configuration envelope carried by every orchestrator and executor message
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RunConfig {
    /// Dynamic configuration map
    #[serde(default)]
    pub configurable: Configurable,
}

impl RunConfig {
    /// Build a config for a run identified by `thread_id`
    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self {
            configurable: Configurable {
                thread_id: Some(thread_id.into()),
                ..Default::default()
            },
        }
    }

    /// The run's thread id, required for any checkpointed operation
    pub fn thread_id(&self) -> Result<&str> {
        self.configurable
            .thread_id
            .as_deref()
            .ok_or_else(|| GraphError::Configuration("missing thread_id".to_string()))
    }

    /// Derive the checkpoint-store config this run config refers to
    pub fn checkpoint_config(&self) -> Result<CheckpointConfig> {
        let thread_id = self.thread_id()?.to_string();
        let mut config = CheckpointConfig::new().with_thread_id(thread_id);
        if let Some(id) = &self.configurable.checkpoint_id {
            config = config.with_checkpoint_id(id.clone());
        }
        if let Some(ns) = &self.configurable.checkpoint_ns {
            config = config.with_checkpoint_ns(ns.clone());
        }
        Ok(config)
    }

    /// Return a copy with `patch` merged into `configurable`
    pub fn patch_configurable(&self, patch: &Configurable) -> RunConfig {
        RunConfig {
            configurable: self.configurable.patched_with(patch),
        }
    }

    /// Return a copy pinned to the given checkpoint config, with the
    /// dedupe flag set for executor-bound messages
    pub fn for_dispatch(&self, checkpoint_config: &CheckpointConfig) -> RunConfig {
        self.patch_configurable(&Configurable {
            thread_id: checkpoint_config.thread_id.clone(),
            checkpoint_id: checkpoint_config.checkpoint_id.clone(),
            checkpoint_ns: checkpoint_config.checkpoint_ns.clone(),
            dedupe_tasks: Some(true),
            ..Default::default()
        })
    }
}
