//! Task types for the super-step engine

use graphflow_checkpoint::ChannelVersion;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// One segment of a task's lineage within a super-step.
///
/// Pull tasks are prepared from channel triggers; push tasks are spawned by
/// another task and addressed by index under their parent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum PathSegment {
    /// Task pulled by a trigger on the named node
    Pull(String),
    /// Nested task spawned at the given index
    Push(u32),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Pull(name) => write!(f, "pull:{name}"),
            PathSegment::Push(idx) => write!(f, "push:{idx}"),
        }
    }
}

/// A scheduled invocation of one node within a super-step
#[derive(Debug, Clone)]
pub struct Task {
    /// Deterministic idempotency key, stable across replays of the same
    /// super-step (see [`derive_task_id`])
    pub id: String,

    /// Node this task invokes
    pub name: String,

    /// Lineage within the super-step
    pub path: Vec<PathSegment>,

    /// Input assembled from the node's read channels
    pub input: serde_json::Value,

    /// Channels whose versions triggered this task
    pub triggers: Vec<String>,

    /// Whether a SCHEDULED write has been persisted for this task.
    /// A scheduled task is never re-dispatched, even across restarts.
    pub scheduled: bool,
}

/// Writes produced by one task, ready to be applied at the step barrier
#[derive(Debug, Clone)]
pub struct TaskWrites {
    /// Lineage of the producing task, used for deterministic ordering
    pub path: Vec<PathSegment>,

    /// Name of the producing node (or a pseudo-name for input writes)
    pub name: String,

    /// Channel writes to apply
    pub writes: Vec<(String, serde_json::Value)>,

    /// Trigger channels the producing task consumed
    pub triggers: Vec<String>,
}

impl TaskWrites {
    /// Writes applied on behalf of the run's initial input; no triggers are
    /// consumed and the lineage is empty so input sorts first.
    pub fn input(name: impl Into<String>, writes: Vec<(String, serde_json::Value)>) -> Self {
        Self {
            path: Vec::new(),
            name: name.into(),
            writes,
            triggers: Vec::new(),
        }
    }
}

/// Derive the deterministic task id.
///
/// UUIDv5 over the node name, the task path, the versions of the trigger
/// channels at preparation time, and a fingerprint of the assembled input.
/// Preparing the same super-step twice (replay after a crash) yields the
/// same ids, which is what lets executors reject duplicate dispatches.
pub fn derive_task_id(
    name: &str,
    path: &[PathSegment],
    trigger_versions: &BTreeMap<String, ChannelVersion>,
    input: &serde_json::Value,
) -> String {
    let mut seed = String::new();
    seed.push_str(name);
    for segment in path {
        seed.push('|');
        seed.push_str(&segment.to_string());
    }
    for (chan, version) in trigger_versions {
        seed.push('|');
        seed.push_str(chan);
        seed.push('=');
        match version {
            ChannelVersion::Int(v) => seed.push_str(&v.to_string()),
            ChannelVersion::Float(v) => seed.push_str(&v.to_string()),
            ChannelVersion::String(v) => seed.push_str(v),
        }
    }
    seed.push('|');
    seed.push_str(&input.to_string());

    Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()).to_string()
}
