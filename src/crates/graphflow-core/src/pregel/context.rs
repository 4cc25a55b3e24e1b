//! Scoped run context: load a run, advance it one super-step, flush
//!
//! A [`RunContext`] is opened around the checkpoint store for exactly one
//! orchestrator message. Opening loads the run's latest checkpoint and the
//! pending writes recorded against it; [`RunContext::tick`] advances the run
//! by at most one super-step; [`RunContext::close`] flushes the in-flight
//! checkpoint write. Callers must close on every path.
//!
//! # One tick
//!
//! ```text
//! RECEIVED -> LOADED -> TICKED --(false)--> NOOP
//!                          |
//!                        (true)
//!                          v
//!                      DURABLE -> caller dispatches unscheduled tasks
//! ```
//!
//! A tick folds state forward in one of two ways:
//!
//! - a *new run* with input: the input is mapped onto the input channels and
//!   a `source=Input` checkpoint is written;
//! - a *wake* for an existing run: if every task of the in-flight super-step
//!   has its executor result recorded as pending writes, the results are
//!   applied and a `source=Loop` checkpoint is written.
//!
//! Either way the next task set is then prepared from the (possibly
//! advanced) checkpoint. Tasks that already carry a SCHEDULED pending write
//! are flagged so the caller does not re-dispatch them; this is what bounds
//! a crash between dispatch and mark to a single replay.
//!
//! Checkpoint persistence is spawned, not awaited inline. The write is
//! joined by [`RunContext::await_durable`], which callers invoke before any
//! effect that the new checkpoint must precede (task dispatch). When no
//! write is in flight it is a no-op.

use crate::config::RunConfig;
use crate::constants::{INTERRUPT, SCHEDULED};
use crate::error::Result;
use crate::graph::Graph;
use crate::pregel::algo::{
    apply_writes, create_checkpoint, map_input, prepare_next_tasks, should_interrupt,
};
use crate::pregel::types::{Task, TaskWrites};
use graphflow_checkpoint::{
    ChannelVersion, Checkpoint, CheckpointConfig, CheckpointError, CheckpointMetadata,
    CheckpointSource, Channel, PendingWrite,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinHandle;

type PutResult = std::result::Result<CheckpointConfig, CheckpointError>;

/// Scoped context binding one message to one run's checkpointed state
pub struct RunContext {
    graph: Arc<Graph>,
    input: Option<serde_json::Value>,
    config: RunConfig,
    checkpoint: Checkpoint,
    checkpoint_config: CheckpointConfig,
    channels: HashMap<String, Box<dyn Channel>>,
    pending_writes: Vec<PendingWrite>,
    tasks: BTreeMap<String, Task>,
    step: i32,
    is_new_run: bool,
    put_checkpoint_task: Option<JoinHandle<PutResult>>,
}

impl RunContext {
    /// Open a context for `config`'s run, loading the latest checkpoint.
    ///
    /// A missing checkpoint means a new run: `input` will seed it on the
    /// first tick. For an existing run the input has already been applied
    /// once, so a redelivered first message degrades to a wake.
    pub async fn open(
        graph: Arc<Graph>,
        input: Option<serde_json::Value>,
        config: RunConfig,
    ) -> Result<Self> {
        let thread_id = config.thread_id()?.to_string();
        let load_config = config.checkpoint_config()?;
        let tuple = graph.checkpointer.get_tuple(&load_config).await?;

        let mut channels = graph.instantiate_channels();
        let (checkpoint, checkpoint_config, pending_writes, step, is_new_run) = match tuple {
            Some(tuple) => {
                for (name, snapshot) in &tuple.checkpoint.channel_values {
                    if let Some(channel) = channels.get_mut(name) {
                        channel.from_checkpoint(snapshot.clone())?;
                    }
                }
                let step = tuple.metadata.step.unwrap_or(-1);
                (
                    tuple.checkpoint,
                    tuple.config,
                    tuple.pending_writes,
                    step,
                    false,
                )
            }
            None => (Checkpoint::empty(), load_config, Vec::new(), -1, true),
        };

        tracing::debug!(
            thread_id = %thread_id,
            checkpoint_id = %checkpoint.id,
            step,
            new_run = is_new_run,
            "run context opened"
        );

        Ok(Self {
            graph,
            input,
            config,
            checkpoint,
            checkpoint_config,
            channels,
            pending_writes,
            tasks: BTreeMap::new(),
            step,
            is_new_run,
            put_checkpoint_task: None,
        })
    }

    /// Advance the run by at most one super-step.
    ///
    /// Returns `true` if tasks were prepared for execution, `false` if the
    /// run is quiescent (or interrupted). When `true`, the caller must
    /// [`await_durable`](Self::await_durable) before dispatching and then
    /// persist a SCHEDULED write per dispatched task.
    pub async fn tick(
        &mut self,
        input_keys: &[String],
        interrupt_before: &HashSet<String>,
        interrupt_after: &HashSet<String>,
    ) -> Result<bool> {
        let mut advanced: Option<CheckpointSource> = None;
        let mut applied_nodes: Vec<String> = Vec::new();

        if let Some(input) = self.input.take() {
            if self.is_new_run {
                let writes = map_input(input_keys, input)?;
                if writes.is_empty() {
                    return Ok(false);
                }
                apply_writes(
                    &mut self.checkpoint,
                    &mut self.channels,
                    vec![TaskWrites::input("__input__", writes)],
                )?;
                advanced = Some(CheckpointSource::Input);
            }
            // input for an existing run was applied by a previous delivery;
            // fall through and treat this message as a wake
        }

        if advanced.is_none() {
            // resume the in-flight super-step: apply executor results once
            // every task of the step has reported
            let current = prepare_next_tasks(&self.checkpoint, &self.graph.nodes, &self.channels)?;
            if !current.is_empty() {
                let mut results: HashMap<&str, Vec<(String, serde_json::Value)>> = HashMap::new();
                for (task_id, channel, value) in &self.pending_writes {
                    if channel != SCHEDULED {
                        results
                            .entry(task_id.as_str())
                            .or_default()
                            .push((channel.clone(), value.clone()));
                    }
                }

                if current.keys().all(|id| results.contains_key(id.as_str())) {
                    let task_writes: Vec<TaskWrites> = current
                        .values()
                        .map(|task| TaskWrites {
                            path: task.path.clone(),
                            name: task.name.clone(),
                            writes: results.remove(task.id.as_str()).unwrap_or_default(),
                            triggers: task.triggers.clone(),
                        })
                        .collect();
                    applied_nodes = current.values().map(|t| t.name.clone()).collect();

                    apply_writes(&mut self.checkpoint, &mut self.channels, task_writes)?;
                    self.pending_writes.clear();
                    advanced = Some(CheckpointSource::Loop);
                }
            }
        }

        let mut tasks = prepare_next_tasks(&self.checkpoint, &self.graph.nodes, &self.channels)?;

        let after_hit = applied_nodes
            .iter()
            .any(|node| interrupt_after.contains(node));
        if after_hit || should_interrupt(&self.checkpoint, interrupt_before, &tasks) {
            self.checkpoint
                .versions_seen
                .insert(INTERRUPT.to_string(), self.checkpoint.channel_versions.clone());
            tasks.clear();
            tracing::debug!(
                checkpoint_id = %self.checkpoint.id,
                "run interrupted, horizon recorded"
            );
        }

        if let Some(source) = advanced {
            if source == CheckpointSource::Loop {
                self.step += 1;
            }
            self.save_checkpoint(source)?;
        } else {
            // replaying an unchanged super-step: pending SCHEDULED markers
            // still name these task ids
            for (task_id, channel, _) in &self.pending_writes {
                if channel == SCHEDULED {
                    if let Some(task) = tasks.get_mut(task_id) {
                        task.scheduled = true;
                    }
                }
            }
        }

        self.tasks = tasks;
        Ok(!self.tasks.is_empty())
    }

    /// Spawn persistence of the current in-memory state as a new checkpoint.
    fn save_checkpoint(&mut self, source: CheckpointSource) -> Result<()> {
        let new_checkpoint = create_checkpoint(&self.checkpoint, &self.channels)?;
        let metadata = CheckpointMetadata::new()
            .with_source(source)
            .with_step(self.step);
        let new_versions = new_checkpoint.channel_versions.clone();

        let saver = self.graph.checkpointer.clone();
        let parent_config = self.checkpoint_config.clone();
        let to_store = new_checkpoint.clone();

        self.checkpoint_config = CheckpointConfig {
            thread_id: parent_config.thread_id.clone(),
            checkpoint_id: Some(new_checkpoint.id.clone()),
            checkpoint_ns: parent_config.checkpoint_ns.clone(),
            extra: parent_config.extra.clone(),
        };
        self.checkpoint = new_checkpoint;

        self.put_checkpoint_task = Some(tokio::spawn(async move {
            saver.put(&parent_config, to_store, metadata, new_versions).await
        }));
        Ok(())
    }

    /// Block until the checkpoint written by the last tick is durable.
    ///
    /// No-op when the tick produced no new checkpoint (pure replay).
    pub async fn await_durable(&mut self) -> Result<()> {
        if let Some(handle) = self.put_checkpoint_task.take() {
            handle.await??;
        }
        Ok(())
    }

    /// Persist writes for a task against the current checkpoint.
    ///
    /// Used by the dispatcher to record SCHEDULED markers; marking also
    /// flips the in-memory task's `scheduled` flag.
    pub async fn put_writes(
        &mut self,
        task_id: &str,
        writes: Vec<(String, serde_json::Value)>,
    ) -> Result<()> {
        let marks_scheduled = writes.iter().any(|(chan, _)| chan == SCHEDULED);
        self.graph
            .checkpointer
            .put_writes(&self.checkpoint_config, writes, task_id.to_string())
            .await?;
        if marks_scheduled {
            if let Some(task) = self.tasks.get_mut(task_id) {
                task.scheduled = true;
            }
        }
        Ok(())
    }

    /// Tasks prepared by the last tick, keyed by task id
    pub fn tasks(&self) -> &BTreeMap<String, Task> {
        &self.tasks
    }

    /// The run's materialized configuration
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Config identifying the checkpoint that enabled the current tasks
    pub fn checkpoint_config(&self) -> &CheckpointConfig {
        &self.checkpoint_config
    }

    /// The current checkpoint
    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    /// Highest version recorded at the last interrupt, if any.
    ///
    /// SCHEDULED writes are pinned to this horizon so a replayed dispatch
    /// can be recognized as already covered.
    pub fn interrupt_horizon(&self) -> Option<ChannelVersion> {
        self.checkpoint
            .versions_seen
            .get(INTERRUPT)?
            .values()
            .fold(None, |acc: Option<ChannelVersion>, v| match acc {
                Some(a) if a.compare(v) == std::cmp::Ordering::Greater => Some(a),
                _ => Some(v.clone()),
            })
    }

    /// Flush outstanding persistence and release the context.
    pub async fn close(mut self) -> Result<()> {
        self.await_durable().await
    }
}
