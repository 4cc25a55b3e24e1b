//! Core checkpoint data structures
//!
//! A [`Checkpoint`] is a durable snapshot of a run taken after each
//! super-step: every channel value, the per-channel version counters, and the
//! per-node record of which versions each node has already consumed
//! (`versions_seen`). Checkpoints are immutable once written; a run advances
//! by writing a new checkpoint, never by mutating an old one.
//!
//! Supporting types:
//!
//! - [`CheckpointConfig`] - identifies a checkpoint: `thread_id` plus an
//!   optional `checkpoint_id` (absent means "latest for the thread")
//! - [`CheckpointMetadata`] - step number, source, parent lineage
//! - [`CheckpointTuple`] - a loaded checkpoint together with its config,
//!   metadata, parent config and the pending writes recorded against it
//! - [`PendingWrite`] - an uncommitted `(task_id, channel, value)` write,
//!   recorded between super-steps (executor results, SCHEDULED markers)
//!
//! # Versions seen
//!
//! `versions_seen` is what makes super-steps idempotent: a node is due to run
//! only while some trigger channel's version exceeds the version the node has
//! recorded. Replaying the same wake message against the same checkpoint
//! therefore prepares the same task set.
//!
//! ```text
//! channel_versions:  { "input": 3 }
//! versions_seen:     { "worker": { "input": 2 } }   -> worker is due
//! versions_seen:     { "worker": { "input": 3 } }   -> worker is quiescent
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use uuid::Uuid;

/// Checkpoint ID type
pub type CheckpointId = String;

/// Pending write tuple: (task_id, channel, value)
///
/// A write recorded against a checkpoint that has not yet been folded into a
/// new checkpoint. Executor results and SCHEDULED dispatch markers both
/// travel through pending writes.
pub type PendingWrite = (String, String, serde_json::Value);

/// Channel version - can be int, float, or string
///
/// A deployment uses one representation throughout; mixed comparisons fall
/// back to numeric ordering, with string versions ordering after numeric
/// ones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ChannelVersion {
    Int(i64),
    Float(f64),
    String(String),
}

impl ChannelVersion {
    /// Get the next version (increments by 1)
    pub fn next(&self) -> Self {
        match self {
            ChannelVersion::Int(v) => ChannelVersion::Int(v + 1),
            ChannelVersion::Float(v) => ChannelVersion::Float(v + 1.0),
            ChannelVersion::String(s) => {
                // String versions carry their ordering in the text itself;
                // appending keeps them monotonic.
                ChannelVersion::String(format!("{s}.1"))
            }
        }
    }

    /// Total ordering across representations
    pub fn compare(&self, other: &Self) -> Ordering {
        use ChannelVersion::*;
        match (self, other) {
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Int(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Int(b)) => a.total_cmp(&(*b as f64)),
            (String(a), String(b)) => a.cmp(b),
            (String(_), _) => Ordering::Greater,
            (_, String(_)) => Ordering::Less,
        }
    }

    /// Whether this version is newer than `other`
    pub fn is_newer_than(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Greater
    }
}

impl PartialOrd for ChannelVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

/// Mapping from channel name to version
pub type ChannelVersions = HashMap<String, ChannelVersion>;

/// Origin of a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Checkpoint created from the input of a newly started run
    Input,
    /// Checkpoint created by a super-step
    Loop,
    /// Checkpoint created from a manual state update
    Update,
    /// Checkpoint created as a copy of another checkpoint
    Fork,
}

/// Metadata associated with a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CheckpointMetadata {
    /// The source of the checkpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CheckpointSource>,

    /// The step number of the checkpoint
    /// -1 for the first "input" checkpoint
    /// 0 for the first "loop" checkpoint
    /// n for the nth checkpoint afterwards
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<i32>,

    /// The IDs of the parent checkpoints
    /// Mapping from checkpoint namespace to checkpoint ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parents: Option<HashMap<String, String>>,

    /// Additional custom metadata
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl CheckpointMetadata {
    /// Create a new checkpoint metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the source
    pub fn with_source(mut self, source: CheckpointSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the step number
    pub fn with_step(mut self, step: i32) -> Self {
        self.step = Some(step);
        self
    }

    /// Set parent checkpoints
    pub fn with_parents(mut self, parents: HashMap<String, String>) -> Self {
        self.parents = Some(parents);
        self
    }

    /// Add custom metadata
    pub fn with_extra(mut self, key: String, value: serde_json::Value) -> Self {
        self.extra.insert(key, value);
        self
    }
}

/// State snapshot at a given point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The version of the checkpoint format (currently 1)
    pub v: i32,

    /// The ID of the checkpoint (unique per thread)
    pub id: CheckpointId,

    /// The timestamp of the checkpoint
    pub ts: DateTime<Utc>,

    /// The values of the channels at the time of the checkpoint
    pub channel_values: HashMap<String, serde_json::Value>,

    /// The versions of the channels at the time of the checkpoint
    pub channel_versions: ChannelVersions,

    /// Map from node name to map from channel name to version seen.
    /// Tracks which channel versions each node has already consumed;
    /// this determines which nodes are due in the next super-step.
    pub versions_seen: HashMap<String, ChannelVersions>,

    /// The channels that were updated by the step that wrote this checkpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_channels: Option<Vec<String>>,
}

impl Checkpoint {
    /// Current checkpoint format version
    pub const CURRENT_VERSION: i32 = 1;

    /// Create a new checkpoint
    pub fn new(
        id: CheckpointId,
        channel_values: HashMap<String, serde_json::Value>,
        channel_versions: ChannelVersions,
        versions_seen: HashMap<String, ChannelVersions>,
    ) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id,
            ts: Utc::now(),
            channel_values,
            channel_versions,
            versions_seen,
            updated_channels: None,
        }
    }

    /// Create an empty checkpoint with a fresh id
    pub fn empty() -> Self {
        Self::new(
            Uuid::new_v4().to_string(),
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
        )
    }

    /// The highest version across all channels, if any channel has one
    pub fn max_channel_version(&self) -> Option<ChannelVersion> {
        self.channel_versions
            .values()
            .fold(None, |acc: Option<ChannelVersion>, v| match acc {
                Some(a) if a.compare(v) == Ordering::Greater => Some(a),
                _ => Some(v.clone()),
            })
    }

    /// Set the updated channels
    pub fn with_updated_channels(mut self, channels: Vec<String>) -> Self {
        self.updated_channels = Some(channels);
        self
    }
}

/// Configuration identifying a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CheckpointConfig {
    /// Thread ID grouping the checkpoints of one run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    /// Specific checkpoint ID to retrieve; absent means latest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<CheckpointId>,

    /// Checkpoint namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_ns: Option<String>,

    /// Additional configuration
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl CheckpointConfig {
    /// Create a new checkpoint configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the thread ID
    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Set the checkpoint ID
    pub fn with_checkpoint_id(mut self, checkpoint_id: impl Into<String>) -> Self {
        self.checkpoint_id = Some(checkpoint_id.into());
        self
    }

    /// Set the checkpoint namespace
    pub fn with_checkpoint_ns(mut self, checkpoint_ns: impl Into<String>) -> Self {
        self.checkpoint_ns = Some(checkpoint_ns.into());
        self
    }
}

/// A loaded checkpoint together with its associated data
#[derive(Debug, Clone)]
pub struct CheckpointTuple {
    /// Configuration identifying this checkpoint
    pub config: CheckpointConfig,

    /// The checkpoint itself
    pub checkpoint: Checkpoint,

    /// Metadata associated with the checkpoint
    pub metadata: CheckpointMetadata,

    /// Parent configuration (if any)
    pub parent_config: Option<CheckpointConfig>,

    /// Writes recorded against this checkpoint that have not yet been folded
    /// into a successor. A restarting orchestrator resumes a half-finished
    /// super-step from these.
    pub pending_writes: Vec<PendingWrite>,
}

impl CheckpointTuple {
    /// Create a new checkpoint tuple
    pub fn new(
        config: CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Self {
        Self {
            config,
            checkpoint,
            metadata,
            parent_config: None,
            pending_writes: Vec::new(),
        }
    }

    /// Set the parent configuration
    pub fn with_parent_config(mut self, parent_config: CheckpointConfig) -> Self {
        self.parent_config = Some(parent_config);
        self
    }

    /// Set the pending writes
    pub fn with_pending_writes(mut self, writes: Vec<PendingWrite>) -> Self {
        self.pending_writes = writes;
        self
    }
}
