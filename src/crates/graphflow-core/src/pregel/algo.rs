//! Core super-step algorithm
//!
//! Three functions carry the Pregel semantics:
//!
//! - [`map_input`] turns a run's initial input into channel writes
//! - [`prepare_next_tasks`] decides which nodes are due, from channel
//!   versions against each node's `versions_seen`
//! - [`apply_writes`] folds completed task writes into the channels at the
//!   step barrier, with deterministic ordering and version bookkeeping
//!
//! [`should_interrupt`] is the interrupt gate: it fires only when some
//! channel has advanced past the last recorded interrupt horizon, so a run
//! resumed past an interrupt does not immediately re-interrupt.

use crate::error::{GraphError, Result};
use crate::graph::NodeSpec;
use crate::pregel::types::{derive_task_id, PathSegment, Task, TaskWrites};
use graphflow_checkpoint::{Channel, ChannelVersion, Checkpoint};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Map a run's initial input onto its input channels.
///
/// An object input fans out by key to matching input channels; any other
/// value is written whole to the sole input channel. A scalar input with
/// several input channels is ambiguous and rejected.
pub fn map_input(
    input_keys: &[String],
    input: serde_json::Value,
) -> Result<Vec<(String, serde_json::Value)>> {
    match input {
        serde_json::Value::Object(map) if input_keys.len() > 1 => Ok(map
            .into_iter()
            .filter(|(key, _)| input_keys.iter().any(|k| k == key))
            .collect()),
        value => match input_keys {
            [single] => Ok(vec![(single.clone(), value)]),
            _ => Err(GraphError::Execution(format!(
                "cannot map non-object input onto {} input channels",
                input_keys.len()
            ))),
        },
    }
}

fn seen_version<'a>(
    checkpoint: &'a Checkpoint,
    node: &str,
    channel: &str,
) -> Option<&'a ChannelVersion> {
    checkpoint
        .versions_seen
        .get(node)
        .and_then(|seen| seen.get(channel))
}

/// Prepare the tasks of the next super-step.
///
/// A node is due when at least one of its trigger channels holds a value and
/// carries a version the node has not seen. Task input is assembled from the
/// node's read channels: the sole read channel's value directly, or an
/// object keyed by channel name when a node reads several.
///
/// Returns tasks keyed by their deterministic id, in node-name order.
pub fn prepare_next_tasks(
    checkpoint: &Checkpoint,
    nodes: &HashMap<String, NodeSpec>,
    channels: &HashMap<String, Box<dyn Channel>>,
) -> Result<BTreeMap<String, Task>> {
    let mut tasks = BTreeMap::new();

    let mut names: Vec<&String> = nodes.keys().collect();
    names.sort();

    for name in names {
        let spec = &nodes[name];

        let triggered: Vec<String> = spec
            .triggers
            .iter()
            .filter(|chan| {
                let available = channels.get(*chan).is_some_and(|c| c.is_available());
                let newer = match checkpoint.channel_versions.get(*chan) {
                    Some(version) => match seen_version(checkpoint, name, chan) {
                        Some(seen) => version.is_newer_than(seen),
                        None => true,
                    },
                    None => false,
                };
                available && newer
            })
            .cloned()
            .collect();

        if triggered.is_empty() {
            continue;
        }

        let input = read_task_input(&spec.reads, channels)?;
        let path = vec![PathSegment::Pull(name.clone())];

        let trigger_versions: BTreeMap<String, ChannelVersion> = triggered
            .iter()
            .filter_map(|chan| {
                checkpoint
                    .channel_versions
                    .get(chan)
                    .map(|v| (chan.clone(), v.clone()))
            })
            .collect();

        let id = derive_task_id(name, &path, &trigger_versions, &input);
        tasks.insert(
            id.clone(),
            Task {
                id,
                name: name.clone(),
                path,
                input,
                triggers: triggered,
                scheduled: false,
            },
        );
    }

    Ok(tasks)
}

fn read_task_input(
    reads: &[String],
    channels: &HashMap<String, Box<dyn Channel>>,
) -> Result<serde_json::Value> {
    let read_one = |chan: &String| -> Result<serde_json::Value> {
        match channels.get(chan) {
            Some(channel) if channel.is_available() => Ok(channel.get()?),
            _ => Ok(serde_json::Value::Null),
        }
    };

    match reads {
        [] => Ok(serde_json::Value::Null),
        [single] => read_one(single),
        many => {
            let mut object = serde_json::Map::new();
            for chan in many {
                object.insert(chan.clone(), read_one(chan)?);
            }
            Ok(serde_json::Value::Object(object))
        }
    }
}

/// Apply completed task writes to the channels at the step barrier.
///
/// 1. Sort task writes by path for deterministic application order.
/// 2. Record `versions_seen` for each task's consumed triggers.
/// 3. Consume trigger channels, bumping their version when consumption
///    changed them.
/// 4. Group the writes by channel and apply them, bumping versions of
///    channels that changed.
/// 5. Notify untouched channels of the step boundary (ephemeral values
///    clear here).
///
/// Returns the set of channels whose values were updated by the writes.
pub fn apply_writes(
    checkpoint: &mut Checkpoint,
    channels: &mut HashMap<String, Box<dyn Channel>>,
    mut task_writes: Vec<TaskWrites>,
) -> Result<HashSet<String>> {
    task_writes.sort_by(|a, b| a.path.cmp(&b.path));

    for task in &task_writes {
        let seen = checkpoint
            .versions_seen
            .entry(task.name.clone())
            .or_default();
        for chan in &task.triggers {
            if let Some(version) = checkpoint.channel_versions.get(chan) {
                seen.insert(chan.clone(), version.clone());
            }
        }
    }

    let next_version = checkpoint
        .max_channel_version()
        .map(|v| v.next())
        .unwrap_or(ChannelVersion::Int(1));

    let consumed: HashSet<&String> = task_writes
        .iter()
        .flat_map(|task| task.triggers.iter())
        .collect();
    for chan in consumed {
        if let Some(channel) = channels.get_mut(chan) {
            if channel.consume() {
                checkpoint
                    .channel_versions
                    .insert(chan.clone(), next_version.clone());
            }
        }
    }

    let mut writes_by_channel: BTreeMap<String, Vec<serde_json::Value>> = BTreeMap::new();
    for task in task_writes {
        for (chan, value) in task.writes {
            writes_by_channel.entry(chan).or_default().push(value);
        }
    }

    let mut updated = HashSet::new();
    for (chan, values) in &writes_by_channel {
        if let Some(channel) = channels.get_mut(chan) {
            if channel.update(values.clone())? {
                checkpoint
                    .channel_versions
                    .insert(chan.clone(), next_version.clone());
                updated.insert(chan.clone());
            }
        } else {
            tracing::warn!(channel = %chan, "dropping write to undeclared channel");
        }
    }

    for (name, channel) in channels.iter_mut() {
        if !writes_by_channel.contains_key(name) {
            channel.update(Vec::new())?;
        }
    }

    checkpoint.updated_channels = Some(updated.iter().cloned().collect());
    Ok(updated)
}

/// Whether the prepared tasks should pause the run.
///
/// Interrupts fire when a task's node is in `interrupt_nodes` and some
/// channel has advanced past the last recorded interrupt horizon
/// (`versions_seen[INTERRUPT]`); otherwise resuming would re-interrupt
/// immediately.
pub fn should_interrupt(
    checkpoint: &Checkpoint,
    interrupt_nodes: &HashSet<String>,
    tasks: &BTreeMap<String, Task>,
) -> bool {
    if interrupt_nodes.is_empty() {
        return false;
    }

    let horizon = checkpoint.versions_seen.get(crate::constants::INTERRUPT);
    let any_updates_since = checkpoint
        .channel_versions
        .iter()
        .any(|(chan, version)| match horizon.and_then(|h| h.get(chan)) {
            Some(seen) => version.is_newer_than(seen),
            None => true,
        });

    any_updates_since && tasks.values().any(|t| interrupt_nodes.contains(&t.name))
}

/// Snapshot the channels into a successor checkpoint carrying the given
/// version bookkeeping.
pub fn create_checkpoint(
    previous: &Checkpoint,
    channels: &HashMap<String, Box<dyn Channel>>,
) -> Result<Checkpoint> {
    let mut channel_values = HashMap::new();
    for (name, channel) in channels {
        if channel.is_available() {
            channel_values.insert(name.clone(), channel.checkpoint()?);
        }
    }

    let mut checkpoint = Checkpoint::new(
        uuid::Uuid::new_v4().to_string(),
        channel_values,
        previous.channel_versions.clone(),
        previous.versions_seen.clone(),
    );
    checkpoint.updated_channels = previous.updated_channels.clone();
    Ok(checkpoint)
}
