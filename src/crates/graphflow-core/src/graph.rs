//! Graph topology
//!
//! A [`Graph`] is the orchestrator-side view of a workflow: node
//! specifications (which channels trigger a node, which it reads and
//! writes), channel specifications (which kind of container each channel
//! is), the input/output channel sets, interrupt points, and the
//! checkpointer the run state lives in.
//!
//! Node *bodies* are deliberately absent. In the distributed deployment the
//! executor workers hold the node implementations and re-derive each task
//! body from the graph definition plus the checkpoint named in the task's
//! config; the orchestrator only needs the topology to decide what is due.
//!
//! ```text
//!              triggers                reads
//!   __start__ ───────────▶ node "n" ◀───────── __start__
//!                             │ writes
//!                             ▼
//!                            "n"  (output channel of the node)
//! ```
//!
//! Build with [`GraphBuilder`], which validates that every referenced
//! channel is declared before the graph can be used.

use crate::error::{GraphError, Result};
use crate::store::Store;
use graphflow_checkpoint::{
    Channel, CheckpointSaver, EphemeralValueChannel, LastValueChannel, TopicChannel,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Which kind of channel to instantiate for a declared channel name.
///
/// Run contexts materialize fresh channel instances per run from these, so
/// a shared `Graph` stays immutable while many runs advance concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSpec {
    /// Single value, last write wins, one write per step
    LastValue,
    /// Append-only list
    Topic,
    /// Holds a value for one step, clears at the next boundary
    Ephemeral,
}

impl ChannelSpec {
    /// Create a fresh channel instance of this kind
    pub fn instantiate(&self) -> Box<dyn Channel> {
        match self {
            ChannelSpec::LastValue => Box::new(LastValueChannel::new()),
            ChannelSpec::Topic => Box::new(TopicChannel::new()),
            ChannelSpec::Ephemeral => Box::new(EphemeralValueChannel::new()),
        }
    }
}

/// Specification for one node in the graph
#[derive(Debug, Clone)]
pub struct NodeSpec {
    /// Unique node name
    pub name: String,

    /// Channels whose version changes make this node due for execution
    pub triggers: Vec<String>,

    /// Channels read to assemble the node's input
    pub reads: Vec<String>,

    /// Channels the node's output is written to by the executor
    pub writes: Vec<String>,
}

impl NodeSpec {
    /// Create a node spec with empty channel sets
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            triggers: Vec::new(),
            reads: Vec::new(),
            writes: Vec::new(),
        }
    }

    /// Set the trigger channels
    pub fn with_triggers<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.triggers = triggers.into_iter().map(Into::into).collect();
        self
    }

    /// Set the read channels
    pub fn with_reads<I, S>(mut self, reads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reads = reads.into_iter().map(Into::into).collect();
        self
    }

    /// Set the write channels
    pub fn with_writes<I, S>(mut self, writes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.writes = writes.into_iter().map(Into::into).collect();
        self
    }
}

/// Orchestrator-side workflow definition
#[derive(Clone)]
pub struct Graph {
    /// Node specifications by name
    pub nodes: HashMap<String, NodeSpec>,

    /// Channel specifications by name
    pub channels: HashMap<String, ChannelSpec>,

    /// Channels that receive the run's initial input
    pub input_channels: Vec<String>,

    /// Channels holding the run's observable output
    pub output_channels: Vec<String>,

    /// Nodes to pause before executing
    pub interrupt_before: HashSet<String>,

    /// Nodes to pause after executing
    pub interrupt_after: HashSet<String>,

    /// Persistence backend for the run state
    pub checkpointer: Arc<dyn CheckpointSaver>,

    /// Optional host-provided shared store
    pub store: Option<Arc<dyn Store>>,

    /// Channel name to triggered node names, derived at build time
    pub trigger_to_nodes: HashMap<String, Vec<String>>,
}

impl Graph {
    /// Start building a graph
    pub fn builder(checkpointer: Arc<dyn CheckpointSaver>) -> GraphBuilder {
        GraphBuilder::new(checkpointer)
    }

    /// Fresh channel instances for a new run context
    pub fn instantiate_channels(&self) -> HashMap<String, Box<dyn Channel>> {
        self.channels
            .iter()
            .map(|(name, spec)| (name.clone(), spec.instantiate()))
            .collect()
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("channels", &self.channels.keys().collect::<Vec<_>>())
            .field("input_channels", &self.input_channels)
            .field("output_channels", &self.output_channels)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Graph`] with structural validation
pub struct GraphBuilder {
    nodes: HashMap<String, NodeSpec>,
    channels: HashMap<String, ChannelSpec>,
    input_channels: Vec<String>,
    output_channels: Vec<String>,
    interrupt_before: HashSet<String>,
    interrupt_after: HashSet<String>,
    checkpointer: Arc<dyn CheckpointSaver>,
    store: Option<Arc<dyn Store>>,
}

impl GraphBuilder {
    /// Create a builder; every graph needs a checkpointer
    pub fn new(checkpointer: Arc<dyn CheckpointSaver>) -> Self {
        Self {
            nodes: HashMap::new(),
            channels: HashMap::new(),
            input_channels: Vec::new(),
            output_channels: Vec::new(),
            interrupt_before: HashSet::new(),
            interrupt_after: HashSet::new(),
            checkpointer,
            store: None,
        }
    }

    /// Declare a channel
    pub fn add_channel(mut self, name: impl Into<String>, spec: ChannelSpec) -> Self {
        self.channels.insert(name.into(), spec);
        self
    }

    /// Add a node specification
    pub fn add_node(mut self, spec: NodeSpec) -> Self {
        self.nodes.insert(spec.name.clone(), spec);
        self
    }

    /// Set the input channels
    pub fn with_input_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_channels = channels.into_iter().map(Into::into).collect();
        self
    }

    /// Set the output channels
    pub fn with_output_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_channels = channels.into_iter().map(Into::into).collect();
        self
    }

    /// Pause before these nodes execute
    pub fn interrupt_before<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interrupt_before = nodes.into_iter().map(Into::into).collect();
        self
    }

    /// Pause after these nodes execute
    pub fn interrupt_after<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interrupt_after = nodes.into_iter().map(Into::into).collect();
        self
    }

    /// Attach a host-provided store capability
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Validate and build the graph
    pub fn build(self) -> Result<Graph> {
        if self.nodes.is_empty() {
            return Err(GraphError::Validation("graph has no nodes".to_string()));
        }
        if self.input_channels.is_empty() {
            return Err(GraphError::Validation(
                "graph has no input channels".to_string(),
            ));
        }

        for name in &self.input_channels {
            if !self.channels.contains_key(name) {
                return Err(GraphError::Validation(format!(
                    "input channel '{name}' is not declared"
                )));
            }
        }
        for spec in self.nodes.values() {
            for chan in spec.triggers.iter().chain(&spec.reads).chain(&spec.writes) {
                if !self.channels.contains_key(chan) {
                    return Err(GraphError::Validation(format!(
                        "node '{}' references undeclared channel '{chan}'",
                        spec.name
                    )));
                }
            }
            if spec.triggers.is_empty() {
                return Err(GraphError::Validation(format!(
                    "node '{}' has no trigger channels",
                    spec.name
                )));
            }
        }
        for node in self.interrupt_before.iter().chain(&self.interrupt_after) {
            if !self.nodes.contains_key(node) {
                return Err(GraphError::Validation(format!(
                    "interrupt names unknown node '{node}'"
                )));
            }
        }

        let mut trigger_to_nodes: HashMap<String, Vec<String>> = HashMap::new();
        for (node_name, spec) in &self.nodes {
            for trigger in &spec.triggers {
                trigger_to_nodes
                    .entry(trigger.clone())
                    .or_default()
                    .push(node_name.clone());
            }
        }
        // deterministic order independent of HashMap iteration
        for nodes in trigger_to_nodes.values_mut() {
            nodes.sort();
        }

        Ok(Graph {
            nodes: self.nodes,
            channels: self.channels,
            input_channels: self.input_channels,
            output_channels: self.output_channels,
            interrupt_before: self.interrupt_before,
            interrupt_after: self.interrupt_after,
            checkpointer: self.checkpointer,
            store: self.store,
            trigger_to_nodes,
        })
    }
}
